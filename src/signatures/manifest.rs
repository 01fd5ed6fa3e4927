//! Partes cubiertas por una firma y registro de las partes de firma en el paquete.
//!
//! Se firman todas las partes salvo `[Content_Types].xml` y `_xmlsignatures/*`. Las
//! relaciones del paquete se resumen sin la relación de origen de firmas, de modo que
//! añadir firmas nuevas no invalida las anteriores.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::{Error, Result};
use crate::package::Package;
use crate::package::constants::{
    CONTENT_TYPES_NS, CONTENT_TYPES_PART, PACKAGE_RELS_PART, RELATIONSHIPS_NS,
    SIGNATURE_CONTENT_TYPE, SIGNATURE_ORIGIN_CONTENT_TYPE, SIGNATURE_ORIGIN_PART,
    SIGNATURE_ORIGIN_REL, SIGNATURE_ORIGIN_RELS_PART, SIGNATURE_REL, SIGNATURES_DIR,
    is_signature_part,
};

const ORIGIN_EXTENSION: &str = "sigs";

/// Resumen SHA-256 de una parte firmada.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Reference {
    pub(crate) uri: String,
    pub(crate) digest: String,
}

/// Calcula las referencias de todas las partes firmables en el orden del paquete.
pub(crate) fn references(package: &Package) -> Result<Vec<Reference>> {
    let mut references = Vec::new();

    for name in package.part_names() {
        if name == CONTENT_TYPES_PART || is_signature_part(name) {
            continue;
        }
        let Some(data) = package.part(name) else {
            continue;
        };

        let digest = if name == PACKAGE_RELS_PART {
            match relationships_digest_input(data)? {
                Some(canonical) => Sha256::digest(&canonical),
                // Sólo contenía la relación de origen: no hay nada que firmar.
                None => continue,
            }
        } else {
            Sha256::digest(data)
        };

        references.push(Reference {
            uri: format!("/{}", name),
            digest: STANDARD.encode(digest),
        });
    }

    Ok(references)
}

/// Forma canónica de `_rels/.rels`: relaciones ordenadas por Id, sin la de origen.
fn relationships_digest_input(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let root = parse(PACKAGE_RELS_PART, data)?;

    let mut relationships: Vec<[String; 4]> = root
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(child) if child.name == "Relationship" => Some(child),
            _ => None,
        })
        .filter(|child| attribute(child, "Type") != SIGNATURE_ORIGIN_REL)
        .map(|child| {
            [
                attribute(child, "Id").to_string(),
                attribute(child, "Type").to_string(),
                attribute(child, "Target").to_string(),
                attribute(child, "TargetMode").to_string(),
            ]
        })
        .collect();

    if relationships.is_empty() {
        return Ok(None);
    }
    relationships.sort();

    let mut canonical = Vec::new();
    for fields in relationships {
        for field in fields {
            canonical.extend_from_slice(field.as_bytes());
            canonical.push(0);
        }
        canonical.push(b'\n');
    }
    Ok(Some(canonical))
}

/// Nombre libre para la siguiente parte de firma (`sig1.xml`, `sig2.xml`, ...).
pub(crate) fn next_signature_part_name(package: &Package) -> String {
    (1..)
        .map(|index| format!("{}sig{}.xml", SIGNATURES_DIR, index))
        .find(|name| !package.contains_part(name))
        .unwrap_or_else(|| format!("{}sig.xml", SIGNATURES_DIR))
}

/// Partes de firma en el orden en que aparecen en el paquete.
pub(crate) fn signature_part_names(package: &Package) -> Vec<String> {
    package
        .part_names()
        .filter(|name| {
            is_signature_part(name)
                && name.ends_with(".xml")
                && !name[SIGNATURES_DIR.len()..].contains('/')
        })
        .map(str::to_string)
        .collect()
}

/// Enlaza una parte de firma recién añadida con el origen de firmas del paquete.
pub(crate) fn register_signature(package: &mut Package, part_name: &str) -> Result<()> {
    if !package.contains_part(SIGNATURE_ORIGIN_PART) {
        package.set_part(SIGNATURE_ORIGIN_PART, Vec::new());
    }

    let package_rels =
        load_or_new(package, PACKAGE_RELS_PART, "Relationships", RELATIONSHIPS_NS)?;
    let (package_rels, changed) = add_relationship(
        package_rels,
        SIGNATURE_ORIGIN_REL,
        SIGNATURE_ORIGIN_PART.to_string(),
        true,
    );
    store(package, PACKAGE_RELS_PART, package_rels, changed)?;

    let origin_rels =
        load_or_new(package, SIGNATURE_ORIGIN_RELS_PART, "Relationships", RELATIONSHIPS_NS)?;
    let target = part_name
        .strip_prefix(SIGNATURES_DIR)
        .unwrap_or(part_name)
        .to_string();
    let (origin_rels, changed) = add_relationship(origin_rels, SIGNATURE_REL, target, false);
    store(package, SIGNATURE_ORIGIN_RELS_PART, origin_rels, changed)?;

    let (mut types, _) = load_or_new(package, CONTENT_TYPES_PART, "Types", CONTENT_TYPES_NS)?;
    let mut changed = false;
    if !has_child_with(&types, "Default", "Extension", ORIGIN_EXTENSION) {
        types.children.push(XMLNode::Element(element_with(
            "Default",
            &[
                ("Extension", ORIGIN_EXTENSION),
                ("ContentType", SIGNATURE_ORIGIN_CONTENT_TYPE),
            ],
        )));
        changed = true;
    }
    let part_uri = format!("/{}", part_name);
    if !has_child_with(&types, "Override", "PartName", &part_uri) {
        types.children.push(XMLNode::Element(element_with(
            "Override",
            &[
                ("PartName", part_uri.as_str()),
                ("ContentType", SIGNATURE_CONTENT_TYPE),
            ],
        )));
        changed = true;
    }
    store(package, CONTENT_TYPES_PART, types, changed)
}

/// Quita todas las partes de firma, la relación de origen y sus tipos de contenido.
///
/// Devuelve el número de firmas eliminadas.
pub(crate) fn unregister_signatures(package: &mut Package) -> Result<usize> {
    let removed = signature_part_names(package).len();
    package.remove_parts_where(is_signature_part);

    if let Some(data) = package.part(PACKAGE_RELS_PART) {
        let mut rels = parse(PACKAGE_RELS_PART, data)?;
        let changed = retain_children(&mut rels, |child| {
            !(child.name == "Relationship" && attribute(child, "Type") == SIGNATURE_ORIGIN_REL)
        });
        store(package, PACKAGE_RELS_PART, rels, changed)?;
    }

    if let Some(data) = package.part(CONTENT_TYPES_PART) {
        let mut types = parse(CONTENT_TYPES_PART, data)?;
        let signature_prefix = format!("/{}", SIGNATURES_DIR);
        let changed = retain_children(&mut types, |child| match child.name.as_str() {
            "Default" => attribute(child, "Extension") != ORIGIN_EXTENSION,
            "Override" => !attribute(child, "PartName").starts_with(&signature_prefix),
            _ => true,
        });
        store(package, CONTENT_TYPES_PART, types, changed)?;
    }

    Ok(removed)
}

fn parse(part: &str, data: &[u8]) -> Result<Element> {
    Element::parse(Cursor::new(data)).map_err(|e| Error::xml(part, e))
}

fn load_or_new(
    package: &Package,
    part: &str,
    root_name: &str,
    namespace: &str,
) -> Result<(Element, bool)> {
    match package.part(part) {
        Some(data) => Ok((parse(part, data)?, false)),
        None => {
            let mut root = Element::new(root_name);
            let mut namespaces = xmltree::Namespace::empty();
            namespaces.force_put("", namespace);
            root.namespace = Some(namespace.to_string());
            root.namespaces = Some(namespaces);
            Ok((root, true))
        }
    }
}

fn add_relationship(
    (mut rels, mut changed): (Element, bool),
    relationship_type: &str,
    target: String,
    unique_type: bool,
) -> (Element, bool) {
    let exists = rels.children.iter().any(|node| match node {
        XMLNode::Element(child) => {
            attribute(child, "Type") == relationship_type
                && (unique_type || attribute(child, "Target") == target)
        }
        _ => false,
    });
    if exists {
        return (rels, changed);
    }

    let id = (1..)
        .map(|index| format!("rIdSig{}", index))
        .find(|id| !has_child_with(&rels, "Relationship", "Id", id))
        .unwrap_or_else(|| "rIdSig".to_string());
    rels.children.push(XMLNode::Element(element_with(
        "Relationship",
        &[
            ("Id", id.as_str()),
            ("Type", relationship_type),
            ("Target", target.as_str()),
        ],
    )));
    changed = true;
    (rels, changed)
}

fn store(package: &mut Package, part: &str, root: Element, changed: bool) -> Result<()> {
    if !changed {
        return Ok(());
    }
    let mut output = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(false)
        .write_document_declaration(true);
    root.write_with_config(&mut output, config)
        .map_err(|e| Error::xml(part, e))?;
    package.set_part(part, output);
    Ok(())
}

fn retain_children<F>(root: &mut Element, mut keep: F) -> bool
where
    F: FnMut(&Element) -> bool,
{
    let before = root.children.len();
    root.children.retain(|node| match node {
        XMLNode::Element(child) => keep(child),
        _ => true,
    });
    before != root.children.len()
}

fn has_child_with(root: &Element, name: &str, key: &str, value: &str) -> bool {
    root.children.iter().any(|node| match node {
        XMLNode::Element(child) => child.name == name && attribute(child, key) == value,
        _ => false,
    })
}

fn element_with(name: &str, attributes: &[(&str, &str)]) -> Element {
    let mut element = Element::new(name);
    for (key, value) in attributes {
        element
            .attributes
            .insert((*key).to_string(), (*value).to_string());
    }
    element
}

fn attribute<'a>(element: &'a Element, key: &str) -> &'a str {
    element.attributes.get(key).map(String::as_str).unwrap_or("")
}
