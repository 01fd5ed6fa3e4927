//! Lectura y escritura de las partes de firma con forma XML-DSig.
//!
//! El bloque `Object Id="idSignedProperties"` contiene, en base64, el JSON exacto que se
//! firmó (referencias, fecha, comentarios y sujeto). El resto de nodos lo replica en
//! forma legible.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use xmltree::{Element, EmitterConfig, XMLNode};

use super::manifest::Reference;
use crate::error::{Error, Result};
use crate::package::constants::XMLDSIG_NS;

const SIGNATURE_METHOD: &str = "http://www.w3.org/2021/04/xmldsig-more#eddsa-ed25519";
const DIGEST_METHOD: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const SIGNED_PROPERTIES_ID: &str = "idSignedProperties";

/// Contenido firmado de una firma.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SignedProperties {
    pub(crate) references: Vec<Reference>,
    pub(crate) sign_time: DateTime<Utc>,
    pub(crate) comments: String,
    pub(crate) subject: String,
}

/// Una parte `_xmlsignatures/sigN.xml` decodificada.
#[derive(Clone, Debug)]
pub(crate) struct SignatureRecord {
    pub(crate) properties: SignedProperties,
    /// JSON firmado tal como aparece en la parte.
    signed_bytes: Vec<u8>,
    /// Referencias repetidas en `SignedInfo`.
    info_references: Vec<Reference>,
    pub(crate) public_key: Vec<u8>,
    signature_value: Vec<u8>,
}

impl SignatureRecord {
    /// Construye un registro firmando `properties` con `sign`.
    pub(crate) fn create<F>(properties: SignedProperties, public_key: [u8; 32], sign: F) -> Result<Self>
    where
        F: FnOnce(&[u8]) -> [u8; 64],
    {
        let signed_bytes = serde_json::to_vec(&properties)
            .map_err(|e| Error::Format(format!("no se pudo serializar la firma: {}", e)))?;
        let signature_value = sign(&signed_bytes).to_vec();

        Ok(Self {
            info_references: properties.references.clone(),
            properties,
            signed_bytes,
            public_key: public_key.to_vec(),
            signature_value,
        })
    }

    /// Comprueba la firma criptográfica y que las referencias coinciden con `current`.
    pub(crate) fn verify(&self, current: &[Reference]) -> bool {
        if self.info_references != self.properties.references {
            return false;
        }
        if self.properties.references != current {
            return false;
        }

        let Ok(key_bytes) = <[u8; 32]>::try_from(self.public_key.as_slice()) else {
            return false;
        };
        let Ok(signature_bytes) = <[u8; 64]>::try_from(self.signature_value.as_slice()) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };

        key.verify(&self.signed_bytes, &Signature::from_bytes(&signature_bytes))
            .is_ok()
    }

    pub(crate) fn to_xml(&self) -> Result<Vec<u8>> {
        let mut root = Element::new("Signature");
        let mut namespaces = xmltree::Namespace::empty();
        namespaces.force_put("", XMLDSIG_NS);
        root.namespace = Some(XMLDSIG_NS.to_string());
        root.namespaces = Some(namespaces);
        root.attributes
            .insert("Id".to_string(), "idPackageSignature".to_string());

        let mut signed_info = Element::new("SignedInfo");
        signed_info.children.push(XMLNode::Element(with_attribute(
            Element::new("SignatureMethod"),
            "Algorithm",
            SIGNATURE_METHOD,
        )));
        for reference in &self.info_references {
            let mut node = with_attribute(Element::new("Reference"), "URI", &reference.uri);
            node.children.push(XMLNode::Element(with_attribute(
                Element::new("DigestMethod"),
                "Algorithm",
                DIGEST_METHOD,
            )));
            node.children
                .push(XMLNode::Element(text_element("DigestValue", &reference.digest)));
            signed_info.children.push(XMLNode::Element(node));
        }
        root.children.push(XMLNode::Element(signed_info));

        root.children.push(XMLNode::Element(text_element(
            "SignatureValue",
            &STANDARD.encode(&self.signature_value),
        )));

        let mut key_info = Element::new("KeyInfo");
        key_info
            .children
            .push(XMLNode::Element(text_element("KeyName", &self.properties.subject)));
        key_info.children.push(XMLNode::Element(text_element(
            "KeyValue",
            &STANDARD.encode(&self.public_key),
        )));
        root.children.push(XMLNode::Element(key_info));

        let mut signed_object = text_element("Object", &STANDARD.encode(&self.signed_bytes));
        signed_object
            .attributes
            .insert("Id".to_string(), SIGNED_PROPERTIES_ID.to_string());
        root.children.push(XMLNode::Element(signed_object));

        let mut property = Element::new("SignatureProperty");
        property.children.push(XMLNode::Element(text_element(
            "SignatureTime",
            &self
                .properties
                .sign_time
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )));
        property.children.push(XMLNode::Element(text_element(
            "SignatureComments",
            &self.properties.comments,
        )));
        let mut properties = Element::new("SignatureProperties");
        properties.children.push(XMLNode::Element(property));
        let mut office_object = Element::new("Object");
        office_object.children.push(XMLNode::Element(properties));
        root.children.push(XMLNode::Element(office_object));

        let mut output = Vec::new();
        let config = EmitterConfig::new()
            .perform_indent(false)
            .write_document_declaration(true);
        root.write_with_config(&mut output, config)
            .map_err(|e| Error::Format(format!("no se pudo escribir la firma: {}", e)))?;
        Ok(output)
    }

    /// Interpreta una firma producida por esta biblioteca.
    ///
    /// Devuelve `None` si el XML es una firma pero no contiene un bloque de
    /// propiedades firmadas legible.
    fn from_element(part: &str, root: &Element) -> Option<Self> {
        let info_references = root
            .get_child("SignedInfo")
            .map(|info| {
                child_elements(info, "Reference")
                    .map(|reference| Reference {
                        uri: reference.attributes.get("URI").cloned().unwrap_or_default(),
                        digest: child_text(reference, "DigestValue"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let signed_object = child_elements(root, "Object").find(|object| {
            object.attributes.get("Id").map(String::as_str) == Some(SIGNED_PROPERTIES_ID)
        })?;

        match decode_record(part, root, signed_object, info_references) {
            Ok(record) => Some(record),
            Err(error) => {
                log::warn!("Propiedades firmadas ilegibles en {}: {}", part, error);
                None
            }
        }
    }
}

fn decode_record(
    part: &str,
    root: &Element,
    signed_object: &Element,
    info_references: Vec<Reference>,
) -> Result<SignatureRecord> {
    let signature_value = decode(part, &child_text(root, "SignatureValue"))?;
    let public_key = root
        .get_child("KeyInfo")
        .map(|info| child_text(info, "KeyValue"))
        .unwrap_or_default();
    let public_key = decode(part, &public_key)?;
    let signed_bytes = decode(part, &element_text(signed_object))?;
    let properties: SignedProperties =
        serde_json::from_slice(&signed_bytes).map_err(|e| Error::xml(part, e))?;

    Ok(SignatureRecord {
        properties,
        signed_bytes,
        info_references,
        public_key,
        signature_value,
    })
}

/// Datos legibles de una firma XML-DSig que esta biblioteca no puede verificar.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ForeignSignature {
    pub(crate) sign_time: Option<DateTime<Utc>>,
    pub(crate) comments: String,
    pub(crate) subject: String,
    /// Certificado X.509 o clave pública incluidos en `KeyInfo`.
    pub(crate) key_material: Vec<u8>,
}

impl ForeignSignature {
    fn from_element(root: &Element) -> Self {
        let sign_time = ["SignatureTime", "SigningTime"]
            .iter()
            .filter_map(|name| find_descendant(root, name))
            .map(|node| match find_descendant(node, "Value") {
                Some(value) => element_text(value),
                None => element_text(node),
            })
            .find_map(|text| DateTime::parse_from_rfc3339(&text).ok())
            .map(|time| time.with_timezone(&Utc));

        let comments = find_descendant(root, "SignatureComments")
            .map(element_text)
            .unwrap_or_default();

        let key_info = root.get_child("KeyInfo");
        let subject = key_info
            .and_then(|info| {
                find_descendant(info, "X509SubjectName").or_else(|| find_descendant(info, "KeyName"))
            })
            .map(element_text)
            .unwrap_or_default();
        let key_material = key_info
            .and_then(|info| {
                find_descendant(info, "X509Certificate").or_else(|| find_descendant(info, "KeyValue"))
            })
            .and_then(|node| {
                let text: String = element_text(node).split_whitespace().collect();
                STANDARD.decode(text).ok()
            })
            .unwrap_or_default();

        Self {
            sign_time,
            comments,
            subject,
            key_material,
        }
    }
}

/// Contenido de una parte `_xmlsignatures/sigN.xml`.
#[derive(Clone, Debug)]
pub(crate) enum SignaturePart {
    Native(SignatureRecord),
    Foreign(ForeignSignature),
}

impl SignaturePart {
    /// Falla con `Format` sólo si la parte no es XML o su raíz no es `<Signature>`.
    pub(crate) fn from_xml(part: &str, contents: &[u8]) -> Result<Self> {
        let root = Element::parse(Cursor::new(contents)).map_err(|e| Error::xml(part, e))?;
        if root.name != "Signature" {
            return Err(Error::xml(part, "el elemento raíz no es <Signature>"));
        }

        Ok(match SignatureRecord::from_element(part, &root) {
            Some(record) => SignaturePart::Native(record),
            None => SignaturePart::Foreign(ForeignSignature::from_element(&root)),
        })
    }
}

fn decode(part: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD.decode(value.trim()).map_err(|e| Error::xml(part, e))
}

fn with_attribute(mut element: Element, key: &str, value: &str) -> Element {
    element.attributes.insert(key.to_string(), value.to_string());
    element
}

fn text_element(name: &str, value: &str) -> Element {
    let mut element = Element::new(name);
    if !value.is_empty() {
        element.children.push(XMLNode::Text(value.to_string()));
    }
    element
}

fn child_elements<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    parent.children.iter().filter_map(move |node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        _ => None,
    })
}

fn find_descendant<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        XMLNode::Element(child) => find_descendant(child, name),
        _ => None,
    })
}

fn child_text(parent: &Element, name: &str) -> String {
    parent.get_child(name).map(element_text).unwrap_or_default()
}

fn element_text(element: &Element) -> String {
    let mut content = String::new();
    for node in &element.children {
        if let XMLNode::Text(text) = node {
            content.push_str(text);
        }
    }
    content.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::OFFICE_SIGNATURE_XML;
    use ed25519_dalek::{Signer, SigningKey};

    fn sample_properties() -> SignedProperties {
        SignedProperties {
            references: vec![Reference {
                uri: "/word/document.xml".to_string(),
                digest: "q1w2e3".to_string(),
            }],
            sign_time: Utc::now(),
            comments: "  Comentario <con> & símbolos  ".to_string(),
            subject: "CN=Morzal.Me".to_string(),
        }
    }

    #[test]
    fn written_signature_parses_back_and_verifies() -> Result<()> {
        let key = SigningKey::from_bytes(&[3_u8; 32]);
        let properties = sample_properties();
        let record = SignatureRecord::create(
            properties.clone(),
            key.verifying_key().to_bytes(),
            |message| key.sign(message).to_bytes(),
        )?;

        let xml = record.to_xml()?;
        let SignaturePart::Native(parsed) = SignaturePart::from_xml("_xmlsignatures/sig1.xml", &xml)?
        else {
            panic!("la firma propia no se reconoció");
        };

        assert_eq!(parsed.properties, properties);
        assert!(parsed.verify(&properties.references));
        Ok(())
    }

    #[test]
    fn changed_references_fail_verification() -> Result<()> {
        let key = SigningKey::from_bytes(&[3_u8; 32]);
        let record = SignatureRecord::create(
            sample_properties(),
            key.verifying_key().to_bytes(),
            |message| key.sign(message).to_bytes(),
        )?;

        let tampered = vec![Reference {
            uri: "/word/document.xml".to_string(),
            digest: "otro".to_string(),
        }];
        assert!(!record.verify(&tampered));
        Ok(())
    }

    #[test]
    fn signature_from_another_key_fails_verification() -> Result<()> {
        let signer = SigningKey::from_bytes(&[3_u8; 32]);
        let impostor = SigningKey::from_bytes(&[4_u8; 32]);
        let properties = sample_properties();
        let record = SignatureRecord::create(
            properties.clone(),
            impostor.verifying_key().to_bytes(),
            |message| signer.sign(message).to_bytes(),
        )?;

        assert!(!record.verify(&properties.references));
        Ok(())
    }

    #[test]
    fn non_signature_xml_is_a_format_error() {
        let result = SignaturePart::from_xml("_xmlsignatures/sig1.xml", b"<Other/>");
        assert!(matches!(result, Err(Error::Format(_))));

        let result = SignaturePart::from_xml("_xmlsignatures/sig1.xml", b"<Signature");
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn office_signature_is_read_as_foreign() -> Result<()> {
        let part = SignaturePart::from_xml("_xmlsignatures/sig1.xml", OFFICE_SIGNATURE_XML.as_bytes())?;
        let SignaturePart::Foreign(foreign) = part else {
            panic!("se esperaba una firma ajena");
        };

        assert_eq!(foreign.subject, "CN=Morzal.Me");
        assert_eq!(foreign.comments, "Firmado en Word");
        assert_eq!(foreign.key_material, b"MIICertificado".to_vec());
        assert_eq!(
            foreign.sign_time.map(|time| time.to_rfc3339()),
            Some("2019-11-05T10:15:30+00:00".to_string())
        );
        Ok(())
    }

    #[test]
    fn unreadable_signed_properties_fall_back_to_foreign() -> Result<()> {
        let xml = r#"<Signature xmlns="http://www.w3.org/2000/09/xmldsig#"><Object Id="idSignedProperties">%%%</Object></Signature>"#;
        let part = SignaturePart::from_xml("_xmlsignatures/sig1.xml", xml.as_bytes())?;
        assert!(matches!(part, SignaturePart::Foreign(_)));
        Ok(())
    }
}
