//! Identidad firmante cargada desde un almacén de claves protegido por frase de paso.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::package::encryption::{
    MAX_SPIN_COUNT, aes256_decrypt, aes256_encrypt, derive_key, random_block,
};

const KEY_STORE_VERSION: u32 = 1;

/// Formato JSON del almacén de claves.
#[derive(Serialize, Deserialize)]
struct KeyStoreFile {
    version: u32,
    subject: String,
    public_key: String,
    spin_count: u32,
    salt: String,
    iv: String,
    sealed_key: String,
}

/// Clave privada y sujeto con los que se producen firmas. Inmutable.
pub struct CertificateHolder {
    subject: String,
    signing_key: SigningKey,
}

impl std::fmt::Debug for CertificateHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateHolder")
            .field("subject", &self.subject)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl CertificateHolder {
    /// Abre el almacén de claves en `path` con la frase de paso indicada.
    pub fn create<P: AsRef<Path>>(path: P, passphrase: &str) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument(
                "la ruta del almacén de claves está vacía".to_string(),
            ));
        }
        let bytes = fs::read(path)?;
        log::debug!("Almacén de claves leído desde {}", path.display());
        Self::from_key_store_bytes(&bytes, passphrase)
    }

    pub fn from_reader<R: Read>(reader: &mut R, passphrase: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_key_store_bytes(&bytes, passphrase)
    }

    pub fn from_key_store_bytes(bytes: &[u8], passphrase: &str) -> Result<Self> {
        let store: KeyStoreFile = serde_json::from_slice(bytes)
            .map_err(|e| Error::Certificate(format!("almacén de claves ilegible: {}", e)))?;
        if store.version != KEY_STORE_VERSION {
            return Err(Error::Certificate(format!(
                "versión de almacén no soportada: {}",
                store.version
            )));
        }

        if store.spin_count > MAX_SPIN_COUNT {
            return Err(Error::Certificate(format!(
                "spin count {} fuera de rango en el almacén de claves",
                store.spin_count
            )));
        }

        let salt = decode_fixed::<16>(&store.salt, "salt")?;
        let iv = decode_fixed::<16>(&store.iv, "iv")?;
        let public_key = decode_fixed::<32>(&store.public_key, "public_key")?;
        let sealed = STANDARD
            .decode(&store.sealed_key)
            .map_err(|e| Error::Certificate(format!("sealed_key: {}", e)))?;

        let key = derive_key(passphrase, &salt, store.spin_count);
        let seed: [u8; 32] = aes256_decrypt(&key, &iv, &sealed)
            .ok()
            .and_then(|plain| plain.try_into().ok())
            .ok_or_else(wrong_passphrase)?;

        let signing_key = SigningKey::from_bytes(&seed);
        if signing_key.verifying_key().to_bytes() != public_key {
            return Err(wrong_passphrase());
        }

        Ok(Self {
            subject: store.subject,
            signing_key,
        })
    }

    /// Genera una identidad nueva con una clave aleatoria.
    pub fn generate(subject: &str) -> Result<Self> {
        if subject.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "el sujeto del certificado está vacío".to_string(),
            ));
        }

        Ok(Self {
            subject: subject.to_string(),
            signing_key: SigningKey::generate(&mut OsRng),
        })
    }

    /// Serializa la identidad en un almacén sellado con `passphrase`.
    pub fn to_key_store_bytes(&self, passphrase: &str, spin_count: u32) -> Result<Vec<u8>> {
        if spin_count > MAX_SPIN_COUNT {
            return Err(Error::InvalidArgument(format!(
                "spin count {} supera el máximo de {}",
                spin_count, MAX_SPIN_COUNT
            )));
        }
        let salt = random_block();
        let iv = random_block();
        let key = derive_key(passphrase, &salt, spin_count);
        let sealed = aes256_encrypt(&key, &iv, &self.signing_key.to_bytes())?;

        let store = KeyStoreFile {
            version: KEY_STORE_VERSION,
            subject: self.subject.clone(),
            public_key: STANDARD.encode(self.public_key()),
            spin_count,
            salt: STANDARD.encode(salt),
            iv: STANDARD.encode(iv),
            sealed_key: STANDARD.encode(sealed),
        };
        serde_json::to_vec_pretty(&store)
            .map_err(|e| Error::Certificate(format!("no se pudo serializar el almacén: {}", e)))
    }

    pub fn write_key_store<P: AsRef<Path>>(
        &self,
        path: P,
        passphrase: &str,
        spin_count: u32,
    ) -> Result<()> {
        let bytes = self.to_key_store_bytes(passphrase, spin_count)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.public_key())
    }

    pub(crate) fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub(crate) fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

pub(crate) fn fingerprint_of(public_key: &[u8]) -> String {
    format!("{:x}", Sha256::digest(public_key))
}

fn wrong_passphrase() -> Error {
    Error::Certificate("la frase de paso del almacén de claves es incorrecta".to_string())
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N]> {
    STANDARD
        .decode(value)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| Error::Certificate(format!("campo `{}` inválido", field)))
}
