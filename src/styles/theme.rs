use std::io::Cursor;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::{Error, Result};
use crate::package::Package;
use crate::package::constants::{DRAWINGML_NS, THEME_PART};

/// Tipografías de un grupo (`a:majorFont` o `a:minorFont`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThemeFonts {
    pub latin: String,
    pub east_asian: String,
    pub complex_script: String,
}

/// Esquema de colores del tema, cada uno como `RRGGBB`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThemeColors {
    pub dark1: String,
    pub light1: String,
    pub dark2: String,
    pub light2: String,
    pub accent1: String,
    pub accent2: String,
    pub accent3: String,
    pub accent4: String,
    pub accent5: String,
    pub accent6: String,
    pub hyperlink: String,
    pub followed_hyperlink: String,
}

impl ThemeColors {
    fn slots(&self) -> [(&'static str, &str); 12] {
        [
            ("dk1", &self.dark1),
            ("lt1", &self.light1),
            ("dk2", &self.dark2),
            ("lt2", &self.light2),
            ("accent1", &self.accent1),
            ("accent2", &self.accent2),
            ("accent3", &self.accent3),
            ("accent4", &self.accent4),
            ("accent5", &self.accent5),
            ("accent6", &self.accent6),
            ("hlink", &self.hyperlink),
            ("folHlink", &self.followed_hyperlink),
        ]
    }

    fn slot_mut(&mut self, slot: &str) -> Option<&mut String> {
        Some(match slot {
            "dk1" => &mut self.dark1,
            "lt1" => &mut self.light1,
            "dk2" => &mut self.dark2,
            "lt2" => &mut self.light2,
            "accent1" => &mut self.accent1,
            "accent2" => &mut self.accent2,
            "accent3" => &mut self.accent3,
            "accent4" => &mut self.accent4,
            "accent5" => &mut self.accent5,
            "accent6" => &mut self.accent6,
            "hlink" => &mut self.hyperlink,
            "folHlink" => &mut self.followed_hyperlink,
            _ => return None,
        })
    }
}

/// Fuentes y colores del tema del documento.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Theme {
    pub major_fonts: ThemeFonts,
    pub minor_fonts: ThemeFonts,
    pub colors: ThemeColors,
}

impl Theme {
    pub fn from_package(package: &Package) -> Result<Self> {
        let root = parse_theme(package)?;
        let elements = drawing_child(&root, "themeElements")
            .ok_or_else(|| Error::xml(THEME_PART, "falta <a:themeElements>"))?;

        let mut theme = Theme::default();
        if let Some(fonts) = drawing_child(elements, "fontScheme") {
            if let Some(major) = drawing_child(fonts, "majorFont") {
                theme.major_fonts = read_fonts(major);
            }
            if let Some(minor) = drawing_child(fonts, "minorFont") {
                theme.minor_fonts = read_fonts(minor);
            }
        }

        if let Some(scheme) = drawing_child(elements, "clrScheme") {
            for slot in drawing_children(scheme) {
                if let Some(target) = theme.colors.slot_mut(&slot.name) {
                    *target = read_color(slot);
                }
            }
        }

        Ok(theme)
    }

    /// Actualiza en el paquete las tipografías y colores que hayan cambiado.
    ///
    /// Un color o una tipografía vacíos dejan intacta su entrada.
    pub fn write_to(&self, package: &mut Package) -> Result<()> {
        for (slot, color) in self.colors.slots() {
            if !color.is_empty() && !is_hex_color(color) {
                return Err(Error::InvalidArgument(format!(
                    "el color {} de {} no tiene formato RRGGBB",
                    color, slot
                )));
            }
        }

        let mut root = parse_theme(package)?;
        let elements = drawing_child_mut(&mut root, "themeElements")
            .ok_or_else(|| Error::xml(THEME_PART, "falta <a:themeElements>"))?;

        let mut changed = false;
        if let Some(fonts) = drawing_child_mut(elements, "fontScheme") {
            if let Some(major) = drawing_child_mut(fonts, "majorFont") {
                changed |= write_fonts(major, &self.major_fonts);
            }
            if let Some(minor) = drawing_child_mut(fonts, "minorFont") {
                changed |= write_fonts(minor, &self.minor_fonts);
            }
        }
        if let Some(scheme) = drawing_child_mut(elements, "clrScheme") {
            for (slot, color) in self.colors.slots() {
                if let Some(element) = drawing_child_mut(scheme, slot) {
                    changed |= write_color(element, color);
                }
            }
        }

        if !changed {
            return Ok(());
        }

        let mut output = Vec::new();
        let config = EmitterConfig::new()
            .perform_indent(false)
            .write_document_declaration(true);
        root.write_with_config(&mut output, config)
            .map_err(|e| Error::xml(THEME_PART, e))?;
        package.set_part(THEME_PART, output);
        log::debug!("Tema del documento actualizado");
        Ok(())
    }
}

fn parse_theme(package: &Package) -> Result<Element> {
    let contents = package
        .part(THEME_PART)
        .ok_or_else(|| Error::Format(format!("el documento no tiene tema {}", THEME_PART)))?;
    Element::parse(Cursor::new(contents)).map_err(|e| Error::xml(THEME_PART, e))
}

fn read_fonts(group: &Element) -> ThemeFonts {
    let typeface = |name: &str| {
        drawing_child(group, name)
            .and_then(|font| font.attributes.get("typeface"))
            .cloned()
            .unwrap_or_default()
    };
    ThemeFonts {
        latin: typeface("latin"),
        east_asian: typeface("ea"),
        complex_script: typeface("cs"),
    }
}

fn write_fonts(group: &mut Element, fonts: &ThemeFonts) -> bool {
    let mut changed = false;
    for (name, value) in [
        ("latin", &fonts.latin),
        ("ea", &fonts.east_asian),
        ("cs", &fonts.complex_script),
    ] {
        if value.is_empty() {
            continue;
        }
        match drawing_child_mut(group, name) {
            Some(font) => {
                if font.attributes.get("typeface") != Some(value) {
                    font.attributes
                        .insert("typeface".to_string(), value.clone());
                    changed = true;
                }
            }
            None => {
                let mut font = drawing_element(name);
                font.attributes
                    .insert("typeface".to_string(), value.clone());
                group.children.push(XMLNode::Element(font));
                changed = true;
            }
        }
    }
    changed
}

/// Color de una entrada del esquema: `a:srgbClr` o el último valor de `a:sysClr`.
fn read_color(slot: &Element) -> String {
    drawing_children(slot)
        .find_map(|color| match color.name.as_str() {
            "srgbClr" => color.attributes.get("val").cloned(),
            "sysClr" => color
                .attributes
                .get("lastClr")
                .or_else(|| color.attributes.get("val"))
                .cloned(),
            _ => None,
        })
        .unwrap_or_default()
}

fn write_color(slot: &mut Element, color: &str) -> bool {
    if color.is_empty() || read_color(slot).eq_ignore_ascii_case(color) {
        return false;
    }
    let mut srgb = drawing_element("srgbClr");
    srgb.attributes
        .insert("val".to_string(), color.to_ascii_uppercase());
    slot.children = vec![XMLNode::Element(srgb)];
    true
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 6 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn drawing_element(name: &str) -> Element {
    let mut element = Element::new(name);
    element.prefix = Some("a".to_string());
    element.namespace = Some(DRAWINGML_NS.to_string());
    element
}

fn drawing_children(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) if child.namespace.as_deref() == Some(DRAWINGML_NS) => Some(child),
        _ => None,
    })
}

fn drawing_child<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    drawing_children(parent).find(|child| child.name == name)
}

fn drawing_child_mut<'a>(parent: &'a mut Element, name: &str) -> Option<&'a mut Element> {
    parent.children.iter_mut().find_map(|node| match node {
        XMLNode::Element(child)
            if child.name == name && child.namespace.as_deref() == Some(DRAWINGML_NS) =>
        {
            Some(child)
        }
        _ => None,
    })
}
