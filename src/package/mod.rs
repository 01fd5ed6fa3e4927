//! Paquetes OOXML en memoria: lectura, cifrado opcional y escritura.

mod archive;
pub mod constants;
pub(crate) mod encryption;
mod io;
pub(crate) mod properties;

pub use archive::PackagePart;
pub use io::{DocumentSource, DocumentTarget};

use crate::config::EncryptionSettings;
use crate::error::{Error, Result};
use encryption::Protection;

/// Opciones para abrir un documento.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Contraseña para descifrar documentos protegidos.
    pub password: Option<String>,
}

impl LoadOptions {
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

/// Documento cargado: partes del contenedor en su orden original.
#[derive(Clone, Debug)]
pub struct Package {
    parts: Vec<PackagePart>,
    protection: Option<Protection>,
}

impl Package {
    /// Abre un documento desde una ruta o un flujo.
    pub fn load<'a>(source: impl Into<DocumentSource<'a>>, options: &LoadOptions) -> Result<Self> {
        let source = source.into();
        log::debug!("Abriendo documento {}", source.describe());
        let bytes = source.read_all()?;
        Self::from_bytes(&bytes, options.password.as_deref())
    }

    /// Interpreta el contenido de un documento, descifrándolo si hace falta.
    pub fn from_bytes(bytes: &[u8], password: Option<&str>) -> Result<Self> {
        if encryption::is_encrypted(bytes) {
            let (plain, protection) = encryption::unseal(bytes, password)?;
            let parts = archive::read_parts(&plain)?;
            return Ok(Self {
                parts,
                protection: Some(protection),
            });
        }

        let parts = archive::read_parts(bytes)
            .map_err(|error| match error {
                Error::Io(io) => Error::Format(io.to_string()),
                other => other,
            })?;
        Ok(Self {
            parts,
            protection: None,
        })
    }

    /// Serializa el paquete; si estaba protegido se vuelve a cifrar con la misma clave.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let zipped = archive::write_parts(&self.parts)?;
        match &self.protection {
            Some(protection) => protection.seal(&zipped),
            None => Ok(zipped),
        }
    }

    pub fn save<'a>(&self, target: impl Into<DocumentTarget<'a>>) -> Result<()> {
        let target = target.into();
        target.validate()?;
        let bytes = self.to_bytes()?;
        log::debug!("Guardando documento en {}", target.describe());
        target.write_all(&bytes)
    }

    pub fn is_encrypted(&self) -> bool {
        self.protection.is_some()
    }

    /// Protege el paquete con `password` a partir del próximo guardado.
    pub fn protect(&mut self, password: &str, settings: &EncryptionSettings) -> Result<()> {
        self.protection = Some(Protection::new(password, settings.spin_count)?);
        Ok(())
    }

    pub fn unprotect(&mut self) {
        self.protection = None;
    }

    pub fn parts(&self) -> &[PackagePart] {
        &self.parts
    }

    /// Nombres de las partes que son archivos (no directorios).
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts
            .iter()
            .filter(|part| !part.is_dir)
            .map(|part| part.name.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|part| !part.is_dir && part.name == name)
            .map(|part| part.data.as_slice())
    }

    pub fn contains_part(&self, name: &str) -> bool {
        self.part(name).is_some()
    }

    /// Sustituye el contenido de una parte o la añade al final si no existe.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self
            .parts
            .iter_mut()
            .find(|part| !part.is_dir && part.name == name)
        {
            Some(part) => part.data = data,
            None => self.parts.push(PackagePart::new(name, data)),
        }
    }

    pub fn remove_part(&mut self, name: &str) -> bool {
        self.remove_parts_where(|part| part == name) > 0
    }

    /// Elimina las partes cuyo nombre cumple `predicate` y devuelve cuántas se quitaron.
    pub(crate) fn remove_parts_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.parts.len();
        self.parts.retain(|part| !predicate(&part.name));
        before - self.parts.len()
    }
}
