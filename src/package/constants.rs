//! Nombres de partes, espacios de nombres y tipos de contenido de un paquete OOXML.

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const PACKAGE_RELS_PART: &str = "_rels/.rels";
pub const CORE_PROPERTIES_PART: &str = "docProps/core.xml";
pub const APP_PROPERTIES_PART: &str = "docProps/app.xml";
pub const CUSTOM_PROPERTIES_PART: &str = "docProps/custom.xml";
pub const STYLES_PART: &str = "word/styles.xml";
pub const THEME_PART: &str = "word/theme/theme1.xml";

pub const SIGNATURES_DIR: &str = "_xmlsignatures/";
pub const SIGNATURE_ORIGIN_PART: &str = "_xmlsignatures/origin.sigs";
pub const SIGNATURE_ORIGIN_RELS_PART: &str = "_xmlsignatures/_rels/origin.sigs.rels";

pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
pub const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const DRAWINGML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const CP_NS: &str = "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub const APP_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties";

pub const SIGNATURE_ORIGIN_REL: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/digital-signature/origin";
pub const SIGNATURE_REL: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/digital-signature/signature";

pub const SIGNATURE_ORIGIN_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-package.digital-signature-origin";
pub const SIGNATURE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-package.digital-signature-xmlsignature+xml";

pub const CUSTOM_PROPERTIES_EMPTY: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/custom-properties\" xmlns:vt=\"http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes\"/>\n";

/// Indica si la parte pertenece a la infraestructura de firmas del paquete.
pub fn is_signature_part(name: &str) -> bool {
    name.starts_with(SIGNATURES_DIR)
}
