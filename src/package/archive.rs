use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::Result;

/// Una entrada del contenedor ZIP con los atributos necesarios para reescribirla.
#[derive(Clone, Debug)]
pub struct PackagePart {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) compression: CompressionMethod,
    pub(crate) unix_mode: Option<u32>,
    pub(crate) last_modified: Option<DateTime>,
    pub(crate) is_dir: bool,
}

impl PackagePart {
    pub(crate) fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            data,
            compression: CompressionMethod::Deflated,
            unix_mode: None,
            last_modified: None,
            is_dir: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// Lee todas las entradas del ZIP conservando orden y opciones de compresión.
pub(crate) fn read_parts(bytes: &[u8]) -> Result<Vec<PackagePart>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut parts = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;

        let mut data = Vec::new();
        if !file.is_dir() {
            file.read_to_end(&mut data)?;
        }

        parts.push(PackagePart {
            name: file.name().to_string(),
            data,
            compression: file.compression(),
            unix_mode: file.unix_mode(),
            last_modified: file.last_modified(),
            is_dir: file.is_dir(),
        });
    }

    Ok(parts)
}

/// Serializa las partes en un nuevo contenedor ZIP.
pub(crate) fn write_parts(parts: &[PackagePart]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for part in parts {
        let mut options = FileOptions::<'_, ()>::default().compression_method(part.compression);
        if let Some(mode) = part.unix_mode {
            options = options.unix_permissions(mode);
        }
        if let Some(time) = part.last_modified {
            options = options.last_modified_time(time);
        }

        if part.is_dir {
            writer.add_directory(part.name.as_str(), options)?;
            continue;
        }

        writer.start_file(part.name.as_str(), options)?;
        writer.write_all(&part.data)?;
    }

    Ok(writer.finish()?.into_inner())
}
