//! Configuración del flujo de firma, cargada desde JSON o con valores por defecto.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Iteraciones de hash por defecto al derivar claves de contraseñas.
pub const DEFAULT_SPIN_COUNT: u32 = 10_000;

/// Define qué ocurre con la metadata ajena a las firmas al eliminarlas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Conserva intactas todas las partes que no son firmas.
    #[default]
    PreserveMetadata,
    /// Además restablece las propiedades de autoría y revisiones.
    StripMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    pub spin_count: u32,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            spin_count: DEFAULT_SPIN_COUNT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringSettings {
    /// Crédito con el que arranca una licencia recién activada.
    pub initial_credit: u64,
    /// Crédito consumido por cada firma.
    pub sign_cost: u64,
    /// Si es `true`, eliminar firmas también consume crédito.
    pub bill_removals: bool,
}

impl Default for MeteringSettings {
    fn default() -> Self {
        Self {
            initial_credit: 100,
            sign_cost: 1,
            bill_removals: false,
        }
    }
}

/// Configuración completa del flujo de firma.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub removal: RemovalPolicy,
    pub encryption: EncryptionSettings,
    pub metering: MeteringSettings,
}

impl WorkflowConfig {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        log::debug!("Configuración cargada desde {}", path.display());
        Ok(config)
    }
}
