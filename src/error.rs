//! Tipos de error del flujo de firma digital.

use zip::result::ZipError;

/// Alias de resultado para las operaciones de la biblioteca.
pub type Result<T> = std::result::Result<T, Error>;

/// Errores que pueden producirse al cargar, firmar o limpiar un documento.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// El origen no es un contenedor de documento reconocido.
    #[error("Formato de documento no reconocido: {0}")]
    Format(String),

    /// Error de lectura o escritura.
    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),

    /// El documento está cifrado y la contraseña no permite descifrarlo.
    #[error("La contraseña del documento es incorrecta")]
    IncorrectPassword,

    /// Se solicitó una firma sin certificado.
    #[error("Se requiere un certificado para firmar el documento")]
    MissingCertificate,

    /// Argumento vacío o inválido, detectado antes de cualquier E/S.
    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    /// La licencia medida no está activa o no tiene crédito suficiente.
    #[error("Error de licencia: {0}")]
    License(String),

    /// El almacén de claves no se pudo abrir o la frase de paso es incorrecta.
    #[error("Certificado no válido: {0}")]
    Certificate(String),

    /// La configuración no se pudo interpretar.
    #[error("Configuración no válida: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<ZipError> for Error {
    fn from(error: ZipError) -> Self {
        match error {
            ZipError::Io(io) => Error::Io(io),
            other => Error::Format(other.to_string()),
        }
    }
}

impl Error {
    pub(crate) fn xml(part: &str, error: impl std::fmt::Display) -> Self {
        Error::Format(format!("{}: {}", part, error))
    }
}
