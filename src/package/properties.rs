//! Restablecimiento de las propiedades de autoría (`docProps/*`) de un paquete.

use std::io::Cursor;
use xmltree::{Element, EmitterConfig, XMLNode};

use super::Package;
use super::constants::{
    APP_NS, APP_PROPERTIES_PART, CORE_PROPERTIES_PART, CP_NS, CUSTOM_PROPERTIES_EMPTY,
    CUSTOM_PROPERTIES_PART, DC_NS, DCTERMS_NS,
};
use crate::error::{Error, Result};

/// Localiza un nodo dentro del XML de propiedades.
#[derive(Clone, Copy)]
struct FieldSpec {
    prefix: Option<&'static str>,
    local_name: &'static str,
    namespace: &'static str,
}

const fn field(prefix: &'static str, local_name: &'static str, namespace: &'static str) -> FieldSpec {
    FieldSpec {
        prefix: Some(prefix),
        local_name,
        namespace,
    }
}

const fn app_field(local_name: &'static str) -> FieldSpec {
    FieldSpec {
        prefix: None,
        local_name,
        namespace: APP_NS,
    }
}

const CORE_RESET_FIELDS: [(FieldSpec, &str); 11] = [
    (field("dc", "creator", DC_NS), ""),
    (field("cp", "lastModifiedBy", CP_NS), ""),
    (field("dcterms", "created", DCTERMS_NS), ""),
    (field("dcterms", "modified", DCTERMS_NS), ""),
    (field("dc", "title", DC_NS), ""),
    (field("dc", "subject", DC_NS), ""),
    (field("dc", "description", DC_NS), ""),
    (field("cp", "keywords", CP_NS), ""),
    (field("cp", "category", CP_NS), ""),
    (field("cp", "contentStatus", CP_NS), ""),
    (field("cp", "revision", CP_NS), "1"),
];

const APP_RESET_FIELDS: [(FieldSpec, &str); 6] = [
    (app_field("Application"), ""),
    (app_field("Company"), ""),
    (app_field("Manager"), ""),
    (app_field("Pages"), "0"),
    (app_field("Words"), "0"),
    (app_field("Lines"), "0"),
];

/// Restablece autoría, fechas y revisiones; vacía las propiedades personalizadas.
///
/// Devuelve `true` si alguna parte cambió.
pub(crate) fn reset_document_properties(package: &mut Package) -> Result<bool> {
    let mut changed = false;

    for (part, fields) in [
        (CORE_PROPERTIES_PART, &CORE_RESET_FIELDS[..]),
        (APP_PROPERTIES_PART, &APP_RESET_FIELDS[..]),
    ] {
        if let Some(contents) = package.part(part)
            && let Some(updated) = apply_field_values(part, contents, fields)?
        {
            package.set_part(part, updated);
            changed = true;
        }
    }

    if let Some(contents) = package.part(CUSTOM_PROPERTIES_PART)
        && contents != CUSTOM_PROPERTIES_EMPTY.as_bytes()
    {
        package.set_part(CUSTOM_PROPERTIES_PART, CUSTOM_PROPERTIES_EMPTY.as_bytes().to_vec());
        changed = true;
    }

    if changed {
        log::debug!("Propiedades del documento restablecidas");
    }
    Ok(changed)
}

fn apply_field_values(
    part: &str,
    contents: &[u8],
    fields: &[(FieldSpec, &str)],
) -> Result<Option<Vec<u8>>> {
    let mut root =
        Element::parse(Cursor::new(contents)).map_err(|e| Error::xml(part, e))?;

    let mut modified = false;
    for &(spec, value) in fields {
        modified |= apply_update_to_element(&mut root, spec, value);
    }
    if !modified {
        return Ok(None);
    }

    let mut output = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(false)
        .write_document_declaration(true);
    root.write_with_config(&mut output, config)
        .map_err(|e| Error::xml(part, e))?;
    Ok(Some(output))
}

/// Inserta o sustituye el texto del elemento descrito por `spec`.
fn apply_update_to_element(root: &mut Element, spec: FieldSpec, new_value: &str) -> bool {
    for node in root.children.iter_mut() {
        if let XMLNode::Element(child) = node
            && child.name == spec.local_name
            && child.namespace.as_deref() == Some(spec.namespace)
        {
            return set_element_text(child, new_value);
        }
    }

    // Un campo ausente sólo se añade cuando su valor restablecido no es vacío.
    if new_value.is_empty() {
        return false;
    }

    let mut new_child = Element::new(spec.local_name);
    new_child.prefix = spec.prefix.map(str::to_string);
    new_child.namespace = Some(spec.namespace.to_string());
    new_child.children.push(XMLNode::Text(new_value.to_string()));
    root.children.push(XMLNode::Element(new_child));
    true
}

fn set_element_text(element: &mut Element, new_value: &str) -> bool {
    let current = element
        .children
        .iter()
        .find_map(|node| match node {
            XMLNode::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .unwrap_or("");
    if current == new_value {
        return false;
    }

    element
        .children
        .retain(|node| !matches!(node, XMLNode::Text(_)));
    if !new_value.is_empty() {
        element.children.push(XMLNode::Text(new_value.to_string()));
    }
    true
}
