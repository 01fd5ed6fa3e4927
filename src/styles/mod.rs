//! Estilos (`word/styles.xml`) y tema (`word/theme/theme1.xml`) de un documento.

mod theme;

pub use theme::{Theme, ThemeColors, ThemeFonts};

use std::io::Cursor;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::{Error, Result};
use crate::package::Package;
use crate::package::constants::{STYLES_PART, WORDML_NS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StyleType {
    Paragraph,
    Character,
    Table,
    Numbering,
}

impl StyleType {
    fn as_str(self) -> &'static str {
        match self {
            StyleType::Paragraph => "paragraph",
            StyleType::Character => "character",
            StyleType::Table => "table",
            StyleType::Numbering => "numbering",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "character" => StyleType::Character,
            "table" => StyleType::Table,
            "numbering" => StyleType::Numbering,
            _ => StyleType::Paragraph,
        }
    }
}

/// Formato de fuente declarado directamente en el estilo.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Font {
    pub name: Option<String>,
    /// Tamaño en puntos.
    pub size: Option<f32>,
    pub bold: bool,
    /// Color `RRGGBB`.
    pub color: Option<String>,
}

/// Un elemento `w:style`.
#[derive(Clone, Debug, PartialEq)]
pub struct Style {
    id: String,
    name: String,
    style_type: StyleType,
    based_on: Option<String>,
    font: Font,
    element: Element,
}

impl Style {
    fn from_element(element: Element) -> Self {
        let id = attribute(&element, "styleId").unwrap_or_default().to_string();
        let name = word_child(&element, "name")
            .and_then(|name| attribute(name, "val"))
            .map(str::to_string)
            .unwrap_or_else(|| id.clone());
        let style_type = StyleType::parse(attribute(&element, "type").unwrap_or_default());
        let based_on = word_child(&element, "basedOn")
            .and_then(|based| attribute(based, "val"))
            .map(str::to_string);
        let font = word_child(&element, "rPr").map(read_font).unwrap_or_default();

        Self {
            id,
            name,
            style_type,
            based_on,
            font,
            element,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn style_type(&self) -> StyleType {
        self.style_type
    }

    /// Identificador del estilo del que hereda.
    pub fn based_on(&self) -> Option<&str> {
        self.based_on.as_deref()
    }

    pub fn font(&self) -> &Font {
        &self.font
    }

    /// Fija la fuente latina (`w:rFonts` `ascii` y `hAnsi`).
    pub fn set_font_name(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "el nombre de la fuente está vacío".to_string(),
            ));
        }
        let fonts = self.run_property_mut("rFonts");
        fonts.attributes.insert("ascii".to_string(), name.to_string());
        fonts.attributes.insert("hAnsi".to_string(), name.to_string());
        self.font.name = Some(name.to_string());
        Ok(())
    }

    /// Fija el tamaño en puntos; se guarda en medios puntos.
    pub fn set_font_size(&mut self, points: f32) -> Result<()> {
        if !points.is_finite() || points <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "tamaño de fuente inválido: {}",
                points
            )));
        }
        let half_points = (points * 2.0).round() as u32;
        for name in ["sz", "szCs"] {
            self.run_property_mut(name)
                .attributes
                .insert("val".to_string(), half_points.to_string());
        }
        self.font.size = Some(half_points as f32 / 2.0);
        Ok(())
    }

    /// Con `false` se escribe `w:b w:val="0"` para anular la negrita heredada.
    pub fn set_bold(&mut self, bold: bool) {
        let element = self.run_property_mut("b");
        if bold {
            element.attributes.remove("val");
        } else {
            element.attributes.insert("val".to_string(), "0".to_string());
        }
        self.font.bold = bold;
    }

    /// Fija el color como `RRGGBB`.
    pub fn set_font_color(&mut self, color: &str) -> Result<()> {
        if color.len() != 6 || !color.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidArgument(format!(
                "el color {} no tiene formato RRGGBB",
                color
            )));
        }
        let color = color.to_ascii_uppercase();
        self.run_property_mut("color")
            .attributes
            .insert("val".to_string(), color.clone());
        self.font.color = Some(color);
        Ok(())
    }

    /// Hijo `name` de `w:rPr`, creado en su posición del esquema si falta.
    fn run_property_mut(&mut self, name: &str) -> &mut Element {
        let run_properties = child_or_insert(&mut self.element, "rPr", STYLE_CHILD_ORDER);
        child_or_insert(run_properties, name, RUN_PROPERTY_ORDER)
    }

    fn rename(&mut self, id: &str, name: &str) {
        self.element
            .attributes
            .insert("styleId".to_string(), id.to_string());
        match self
            .element
            .children
            .iter_mut()
            .find_map(|node| match node {
                XMLNode::Element(child) if is_word_element(child, "name") => Some(child),
                _ => None,
            }) {
            Some(child) => {
                child.attributes.insert("val".to_string(), name.to_string());
            }
            None => {
                let mut child = word_element("name");
                child.attributes.insert("val".to_string(), name.to_string());
                self.element.children.insert(0, XMLNode::Element(child));
            }
        }
        self.id = id.to_string();
        self.name = name.to_string();
    }
}

fn read_font(run_properties: &Element) -> Font {
    let name = word_child(run_properties, "rFonts").and_then(|fonts| {
        attribute(fonts, "ascii")
            .or_else(|| attribute(fonts, "hAnsi"))
            .map(str::to_string)
    });
    // `w:sz` se expresa en medios puntos.
    let size = word_child(run_properties, "sz")
        .and_then(|size| attribute(size, "val"))
        .and_then(|value| value.parse::<f32>().ok())
        .map(|half_points| half_points / 2.0);
    let bold = word_child(run_properties, "b")
        .map(|bold| !matches!(attribute(bold, "val"), Some("0" | "false" | "off")))
        .unwrap_or(false);
    let color = word_child(run_properties, "color")
        .and_then(|color| attribute(color, "val"))
        .map(str::to_string);

    Font {
        name,
        size,
        bold,
        color,
    }
}

/// Hoja de estilos de un documento.
///
/// Conserva los nodos que no son estilos (`w:docDefaults`, `w:latentStyles`...) para
/// reescribirlos sin cambios.
#[derive(Clone, Debug)]
pub struct StyleSheet {
    root: Element,
    styles: Vec<Style>,
}

impl StyleSheet {
    /// Lee `word/styles.xml`; si el documento no lo tiene la hoja queda vacía.
    pub fn from_package(package: &Package) -> Result<Self> {
        let Some(contents) = package.part(STYLES_PART) else {
            log::debug!("El documento no tiene {}", STYLES_PART);
            return Ok(Self {
                root: empty_root(),
                styles: Vec::new(),
            });
        };

        let mut root =
            Element::parse(Cursor::new(contents)).map_err(|e| Error::xml(STYLES_PART, e))?;
        if !is_word_element(&root, "styles") {
            return Err(Error::xml(STYLES_PART, "el elemento raíz no es <w:styles>"));
        }

        let mut styles = Vec::new();
        root.children.retain(|node| match node {
            XMLNode::Element(child) if is_word_element(child, "style") => {
                styles.push(Style::from_element(child.clone()));
                false
            }
            _ => true,
        });

        Ok(Self { root, styles })
    }

    pub fn styles(&self) -> &[Style] {
        &self.styles
    }

    /// Nombres de los estilos en el orden del documento.
    pub fn names(&self) -> Vec<&str> {
        self.styles.iter().map(Style::name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Style> {
        self.styles.iter().find(|style| style.name == name)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Crea un estilo vacío de tipo `style_type` llamado `name`.
    ///
    /// Falla si ya existe un estilo con ese nombre.
    pub fn add(&mut self, style_type: StyleType, name: &str) -> Result<&mut Style> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "el nombre del estilo está vacío".to_string(),
            ));
        }
        if self.get(name).is_some() {
            return Err(Error::InvalidArgument(format!(
                "ya existe un estilo llamado {}",
                name
            )));
        }

        let base_id: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
        let base_id = if base_id.is_empty() { "Style".to_string() } else { base_id };
        let id = unique_value(&base_id, |candidate| {
            self.styles.iter().any(|existing| existing.id == candidate)
        });

        let mut element = word_element("style");
        element
            .attributes
            .insert("type".to_string(), style_type.as_str().to_string());
        element
            .attributes
            .insert("customStyle".to_string(), "1".to_string());
        element.attributes.insert("styleId".to_string(), id);
        let mut name_element = word_element("name");
        name_element
            .attributes
            .insert("val".to_string(), name.to_string());
        element.children.push(XMLNode::Element(name_element));

        log::debug!("Estilo {} creado", name);
        let index = self.styles.len();
        self.styles.push(Style::from_element(element));
        Ok(&mut self.styles[index])
    }

    /// Importa una copia de `style`. Si el nombre ya existe la copia se renombra
    /// `Nombre_0`, `Nombre_1`, ...; el identificador se hace único del mismo modo.
    ///
    /// Devuelve el nombre final de la copia.
    pub fn add_copy(&mut self, style: &Style) -> String {
        let name = unique_value(style.name(), |candidate| self.get(candidate).is_some());
        let id = unique_value(style.id(), |candidate| {
            self.styles.iter().any(|existing| existing.id == candidate)
        });

        let mut copy = style.clone();
        if copy.id != id || copy.name != name {
            copy.rename(&id, &name);
        }
        log::debug!("Estilo {} copiado como {}", style.name(), name);
        self.styles.push(copy);
        name
    }

    /// Copia todos los estilos de `template`: los de igual identificador se
    /// sustituyen y el resto se añaden al final.
    pub fn copy_from_template(&mut self, template: &StyleSheet) {
        for style in &template.styles {
            match self.styles.iter_mut().find(|existing| existing.id == style.id) {
                Some(existing) => *existing = style.clone(),
                None => self.styles.push(style.clone()),
            }
        }
        log::debug!("Copiados {} estilos de la plantilla", template.styles.len());
    }

    /// Guarda la hoja en `word/styles.xml`.
    ///
    /// El paquete ya debe tener una parte de estilos registrada.
    pub fn write_to(&self, package: &mut Package) -> Result<()> {
        if !package.contains_part(STYLES_PART) {
            return Err(Error::Format(format!(
                "el documento no tiene parte de estilos {}",
                STYLES_PART
            )));
        }

        let mut root = self.root.clone();
        root.children.extend(
            self.styles
                .iter()
                .map(|style| XMLNode::Element(style.element.clone())),
        );
        let declared: Vec<String> = root
            .namespaces
            .iter()
            .flat_map(|namespaces| namespaces.0.keys().cloned())
            .collect();
        qualify_attributes(&mut root, &declared);

        let mut output = Vec::new();
        let config = EmitterConfig::new()
            .perform_indent(false)
            .write_document_declaration(true);
        root.write_with_config(&mut output, config)
            .map_err(|e| Error::xml(STYLES_PART, e))?;
        package.set_part(STYLES_PART, output);
        Ok(())
    }
}

/// Orden de los hijos de `w:style` (CT_Style).
const STYLE_CHILD_ORDER: &[&str] = &[
    "name", "aliases", "basedOn", "next", "link", "autoRedefine", "hidden", "uiPriority",
    "semiHidden", "unhideWhenUsed", "qFormat", "locked", "personal", "personalCompose",
    "personalReply", "rsid", "pPr", "rPr", "tblPr", "trPr", "tcPr", "tblStylePr",
];

/// Orden de los hijos de `w:rPr` (CT_RPr).
const RUN_PROPERTY_ORDER: &[&str] = &[
    "rStyle", "rFonts", "b", "bCs", "i", "iCs", "caps", "smallCaps", "strike", "dstrike",
    "outline", "shadow", "emboss", "imprint", "noProof", "snapToGrid", "vanish", "webHidden",
    "color", "spacing", "w", "kern", "position", "sz", "szCs", "highlight", "u", "effect",
    "bdr", "shd", "fitText", "vertAlign", "rtl", "cs", "em", "lang", "eastAsianLayout",
    "specVanish", "oMath",
];

/// Devuelve el hijo WordprocessingML `name`, insertándolo antes del primer hermano
/// que le siga en `order` si no existe.
fn child_or_insert<'a>(parent: &'a mut Element, name: &str, order: &[&str]) -> &'a mut Element {
    let rank = |candidate: &str| {
        order
            .iter()
            .position(|known| *known == candidate)
            .unwrap_or(order.len())
    };

    let existing = parent.children.iter().position(|node| {
        matches!(node, XMLNode::Element(child) if is_word_element(child, name))
    });
    let index = match existing {
        Some(index) => index,
        None => {
            let own_rank = rank(name);
            let index = parent
                .children
                .iter()
                .position(|node| match node {
                    XMLNode::Element(child) => {
                        child.namespace.as_deref() == Some(WORDML_NS) && rank(child.name.as_str()) > own_rank
                    }
                    _ => false,
                })
                .unwrap_or(parent.children.len());
            parent
                .children
                .insert(index, XMLNode::Element(word_element(name)));
            index
        }
    };

    match &mut parent.children[index] {
        XMLNode::Element(child) => child,
        _ => unreachable!("el índice apunta a un elemento"),
    }
}

fn unique_value<F>(base: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }
    (0..)
        .map(|index| format!("{}_{}", base, index))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn empty_root() -> Element {
    let mut root = word_element("styles");
    let mut namespaces = xmltree::Namespace::empty();
    namespaces.force_put("w", WORDML_NS);
    root.namespaces = Some(namespaces);
    root
}

fn word_element(name: &str) -> Element {
    let mut element = Element::new(name);
    element.prefix = Some("w".to_string());
    element.namespace = Some(WORDML_NS.to_string());
    element
}

fn is_word_element(element: &Element, name: &str) -> bool {
    element.name == name && element.namespace.as_deref() == Some(WORDML_NS)
}

fn word_child<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(child) if is_word_element(child, name) => Some(child),
        _ => None,
    })
}

fn attribute<'a>(element: &'a Element, key: &str) -> Option<&'a str> {
    element
        .attributes
        .get(key)
        .or_else(|| element.attributes.get(&format!("w:{}", key)))
        .map(String::as_str)
}

/// Atributos de otros espacios de nombres que aparecen en `word/styles.xml`.
const FOREIGN_ATTRIBUTES: &[(&str, &str)] = &[
    ("Ignorable", "mc"),
    ("space", "xml"),
    ("paraId", "w14"),
    ("textId", "w14"),
    ("noVBand", "w14"),
    ("durableId", "w16cid"),
];

/// xmltree sólo conserva el nombre local de los atributos. Al escribir se
/// recupera el prefijo: el del espacio propio si el atributo pertenece a otro
/// espacio y se declaró en el documento, `w:` en el resto de casos.
fn qualify_attributes(element: &mut Element, declared: &[String]) {
    if element.namespace.as_deref() == Some(WORDML_NS) {
        let attributes = std::mem::take(&mut element.attributes);
        element.attributes = attributes
            .into_iter()
            .map(|(key, value)| {
                if key.contains(':') {
                    return (key, value);
                }
                let foreign = FOREIGN_ATTRIBUTES
                    .iter()
                    .find(|(local, prefix)| {
                        *local == key
                            && (*prefix == "xml" || declared.iter().any(|known| known == prefix))
                    })
                    .map(|(_, prefix)| *prefix);
                match foreign {
                    Some(prefix) => (format!("{}:{}", prefix, key), value),
                    None => (format!("w:{}", key), value),
                }
            })
            .collect();
    }
    for node in element.children.iter_mut() {
        if let XMLNode::Element(child) = node {
            qualify_attributes(child, declared);
        }
    }
}
