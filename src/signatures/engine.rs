use chrono::{DateTime, Utc};

use crate::config::RemovalPolicy;
use crate::error::Result;
use crate::package::Package;
use crate::package::properties::reset_document_properties;

use super::certificate::{CertificateHolder, fingerprint_of};
use super::manifest;
use super::options::{DigitalSignature, DigitalSignatureCollection, DigitalSignatureType, SignOptions};
use super::xmldsig::{SignaturePart, SignatureRecord, SignedProperties};

/// Capacidades que el flujo de firma necesita de un motor de documentos.
pub trait DocumentEngine {
    type Document;

    /// Interpreta el contenido y lo descifra con `password` si está protegido.
    fn open(&self, bytes: &[u8], password: Option<&str>) -> Result<Self::Document>;

    fn read_signatures(&self, document: &Self::Document) -> Result<DigitalSignatureCollection>;

    /// Quita todas las firmas y devuelve cuántas había.
    fn strip_signatures(&self, document: &mut Self::Document, policy: RemovalPolicy) -> Result<usize>;

    /// Añade una firma nueva sin tocar las existentes.
    fn append_signature(
        &self,
        document: &mut Self::Document,
        holder: &CertificateHolder,
        options: &SignOptions,
    ) -> Result<DigitalSignature>;

    fn save(&self, document: &Self::Document) -> Result<Vec<u8>>;
}

/// Motor local para paquetes OOXML (`.docx`, `.xlsx`, `.pptx`).
#[derive(Clone, Copy, Debug, Default)]
pub struct OoxmlEngine;

impl DocumentEngine for OoxmlEngine {
    type Document = Package;

    fn open(&self, bytes: &[u8], password: Option<&str>) -> Result<Package> {
        Package::from_bytes(bytes, password)
    }

    fn read_signatures(&self, package: &Package) -> Result<DigitalSignatureCollection> {
        let current = manifest::references(package)?;
        let mut signatures = Vec::new();

        for name in manifest::signature_part_names(package) {
            let Some(contents) = package.part(&name) else {
                continue;
            };
            let signature = match SignaturePart::from_xml(&name, contents)? {
                SignaturePart::Native(record) => {
                    let is_valid = record.verify(&current);
                    if !is_valid {
                        log::warn!("La firma {} no es válida para el contenido actual", name);
                    }
                    DigitalSignature {
                        signature_type: DigitalSignatureType::XmlDsig,
                        sign_time: record.properties.sign_time,
                        comments: record.properties.comments,
                        subject_name: record.properties.subject,
                        fingerprint: fingerprint_of(&record.public_key),
                        is_valid,
                    }
                }
                SignaturePart::Foreign(foreign) => {
                    log::warn!(
                        "La firma {} no tiene un formato verificable; se marca como no válida",
                        name
                    );
                    DigitalSignature {
                        signature_type: DigitalSignatureType::XmlDsig,
                        // Sin fecha legible se usa el origen de la época Unix.
                        sign_time: foreign.sign_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                        comments: foreign.comments,
                        subject_name: foreign.subject,
                        fingerprint: if foreign.key_material.is_empty() {
                            String::new()
                        } else {
                            fingerprint_of(&foreign.key_material)
                        },
                        is_valid: false,
                    }
                }
            };
            signatures.push(signature);
        }

        Ok(DigitalSignatureCollection::new(signatures))
    }

    fn strip_signatures(&self, package: &mut Package, policy: RemovalPolicy) -> Result<usize> {
        let removed = manifest::unregister_signatures(package)?;
        if policy == RemovalPolicy::StripMetadata {
            reset_document_properties(package)?;
        }
        Ok(removed)
    }

    fn append_signature(
        &self,
        package: &mut Package,
        holder: &CertificateHolder,
        options: &SignOptions,
    ) -> Result<DigitalSignature> {
        let properties = SignedProperties {
            references: manifest::references(package)?,
            sign_time: options.sign_time,
            comments: options.comments.clone(),
            subject: holder.subject().to_string(),
        };
        log::debug!(
            "Firmando {} partes como {}",
            properties.references.len(),
            holder.subject()
        );

        let record =
            SignatureRecord::create(properties, holder.public_key(), |message| holder.sign(message))?;

        let part_name = manifest::next_signature_part_name(package);
        package.set_part(&part_name, record.to_xml()?);
        manifest::register_signature(package, &part_name)?;

        Ok(DigitalSignature {
            signature_type: DigitalSignatureType::XmlDsig,
            sign_time: record.properties.sign_time,
            comments: record.properties.comments,
            subject_name: record.properties.subject,
            fingerprint: holder.fingerprint(),
            is_valid: true,
        })
    }

    fn save(&self, package: &Package) -> Result<Vec<u8>> {
        package.to_bytes()
    }
}
