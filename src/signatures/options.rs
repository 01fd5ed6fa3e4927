use chrono::{DateTime, Utc};
use std::ops::Index;

/// Parámetros de una nueva firma.
#[derive(Clone, Debug)]
pub struct SignOptions {
    /// Comentario libre asociado a la firma.
    pub comments: String,
    /// Momento registrado en la firma.
    pub sign_time: DateTime<Utc>,
    /// Sólo se usa si el documento de origen está cifrado.
    pub decryption_password: Option<String>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            comments: String::new(),
            sign_time: Utc::now(),
            decryption_password: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigitalSignatureType {
    XmlDsig,
}

/// Firma encontrada en un documento. Sólo lectura.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigitalSignature {
    pub(crate) signature_type: DigitalSignatureType,
    pub(crate) sign_time: DateTime<Utc>,
    pub(crate) comments: String,
    pub(crate) subject_name: String,
    pub(crate) fingerprint: String,
    pub(crate) is_valid: bool,
}

impl DigitalSignature {
    pub fn signature_type(&self) -> DigitalSignatureType {
        self.signature_type
    }

    pub fn sign_time(&self) -> DateTime<Utc> {
        self.sign_time
    }

    pub fn comments(&self) -> &str {
        &self.comments
    }

    /// Sujeto del certificado firmante.
    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    /// SHA-256 en hexadecimal de la clave pública firmante.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }
}

/// Firmas de un documento en el orden en que se añadieron.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DigitalSignatureCollection {
    signatures: Vec<DigitalSignature>,
}

impl DigitalSignatureCollection {
    pub(crate) fn new(signatures: Vec<DigitalSignature>) -> Self {
        Self { signatures }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DigitalSignature> {
        self.signatures.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DigitalSignature> {
        self.signatures.iter()
    }

    /// `true` si hay al menos una firma y todas son válidas.
    pub fn is_valid(&self) -> bool {
        !self.signatures.is_empty() && self.signatures.iter().all(DigitalSignature::is_valid)
    }
}

impl Index<usize> for DigitalSignatureCollection {
    type Output = DigitalSignature;

    fn index(&self, index: usize) -> &Self::Output {
        &self.signatures[index]
    }
}

impl<'a> IntoIterator for &'a DigitalSignatureCollection {
    type Item = &'a DigitalSignature;
    type IntoIter = std::slice::Iter<'a, DigitalSignature>;

    fn into_iter(self) -> Self::IntoIter {
        self.signatures.iter()
    }
}

impl IntoIterator for DigitalSignatureCollection {
    type Item = DigitalSignature;
    type IntoIter = std::vec::IntoIter<DigitalSignature>;

    fn into_iter(self) -> Self::IntoIter {
        self.signatures.into_iter()
    }
}
