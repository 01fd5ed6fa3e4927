//! Orígenes y destinos de documentos: rutas del sistema de archivos o flujos.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

/// De dónde se lee un documento. Ruta y flujo son equivalentes.
pub enum DocumentSource<'a> {
    Path(PathBuf),
    Stream(&'a mut dyn Read),
}

/// Dónde se escribe un documento.
pub enum DocumentTarget<'a> {
    Path(PathBuf),
    Stream(&'a mut dyn Write),
}

impl DocumentSource<'_> {
    /// Rechaza rutas vacías sin tocar el sistema de archivos.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            DocumentSource::Path(path) if path.as_os_str().is_empty() => Err(
                Error::InvalidArgument("la ruta del documento de origen está vacía".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Lee el documento completo en memoria.
    pub(crate) fn read_all(self) -> Result<Vec<u8>> {
        self.validate()?;
        match self {
            DocumentSource::Path(path) => Ok(fs::read(path)?),
            DocumentSource::Stream(reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            DocumentSource::Path(path) => path.display().to_string(),
            DocumentSource::Stream(_) => "<flujo>".to_string(),
        }
    }
}

impl DocumentTarget<'_> {
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            DocumentTarget::Path(path) if path.as_os_str().is_empty() => Err(
                Error::InvalidArgument("la ruta del documento de destino está vacía".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Escribe el documento completo. Con rutas se usa un temporal que luego se renombra.
    pub(crate) fn write_all(self, bytes: &[u8]) -> Result<()> {
        self.validate()?;
        match self {
            DocumentTarget::Path(path) => {
                let temp_path = generate_temp_filename(&path);
                if let Err(error) = fs::write(&temp_path, bytes) {
                    let _ = fs::remove_file(&temp_path);
                    return Err(error.into());
                }
                fs::rename(&temp_path, &path).map_err(|error| {
                    let _ = fs::remove_file(&temp_path);
                    Error::Io(error)
                })
            }
            DocumentTarget::Stream(writer) => {
                writer.write_all(bytes)?;
                writer.flush()?;
                Ok(())
            }
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            DocumentTarget::Path(path) => path.display().to_string(),
            DocumentTarget::Stream(_) => "<flujo>".to_string(),
        }
    }
}

/// Crea un nombre de archivo temporal único en el mismo directorio que `path`.
fn generate_temp_filename(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let suffix = Uuid::new_v4().simple();

    match path.extension() {
        Some(extension) => parent.join(format!(
            ".{}_temp_{}.{}",
            stem,
            suffix,
            extension.to_string_lossy()
        )),
        None => parent.join(format!(".{}_temp_{}", stem, suffix)),
    }
}

impl From<PathBuf> for DocumentSource<'_> {
    fn from(path: PathBuf) -> Self {
        DocumentSource::Path(path)
    }
}

impl From<&Path> for DocumentSource<'_> {
    fn from(path: &Path) -> Self {
        DocumentSource::Path(path.to_path_buf())
    }
}

impl From<&PathBuf> for DocumentSource<'_> {
    fn from(path: &PathBuf) -> Self {
        DocumentSource::Path(path.clone())
    }
}

impl From<&str> for DocumentSource<'_> {
    fn from(path: &str) -> Self {
        DocumentSource::Path(PathBuf::from(path))
    }
}

impl From<String> for DocumentSource<'_> {
    fn from(path: String) -> Self {
        DocumentSource::Path(PathBuf::from(path))
    }
}

impl<'a, R: Read> From<&'a mut R> for DocumentSource<'a> {
    fn from(reader: &'a mut R) -> Self {
        DocumentSource::Stream(reader)
    }
}

impl From<PathBuf> for DocumentTarget<'_> {
    fn from(path: PathBuf) -> Self {
        DocumentTarget::Path(path)
    }
}

impl From<&Path> for DocumentTarget<'_> {
    fn from(path: &Path) -> Self {
        DocumentTarget::Path(path.to_path_buf())
    }
}

impl From<&PathBuf> for DocumentTarget<'_> {
    fn from(path: &PathBuf) -> Self {
        DocumentTarget::Path(path.clone())
    }
}

impl From<&str> for DocumentTarget<'_> {
    fn from(path: &str) -> Self {
        DocumentTarget::Path(PathBuf::from(path))
    }
}

impl From<String> for DocumentTarget<'_> {
    fn from(path: String) -> Self {
        DocumentTarget::Path(PathBuf::from(path))
    }
}

impl<'a, W: Write> From<&'a mut W> for DocumentTarget<'a> {
    fn from(writer: &'a mut W) -> Self {
        DocumentTarget::Stream(writer)
    }
}
