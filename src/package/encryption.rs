//! Protección por contraseña de paquetes y claves privadas.
//!
//! Un paquete protegido se guarda como un sobre binario:
//!
//! ```text
//! "DSPKENC1" | spin count (u32 LE) | salt (16) | verificador (32) | IV (16) | AES-256-CBC
//! ```
//!
//! La clave se deriva como en el cifrado ágil de ECMA-376: `H0 = SHA-256(salt ‖ contraseña)`
//! con la contraseña en UTF-16LE y `Hn = SHA-256(LE32(n) ‖ Hn-1)` durante `spin count` rondas.

use aes::Aes256;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};
use sha2::{Digest, Sha256};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

pub const ENCRYPTED_MAGIC: &[u8; 8] = b"DSPKENC1";

/// Límite de iteraciones que admite el cifrado ágil de ECMA-376.
pub const MAX_SPIN_COUNT: u32 = 10_000_000;

const BLOCK_LEN: usize = 16;
const VERIFIER_LEN: usize = 32;
const HEADER_LEN: usize = ENCRYPTED_MAGIC.len() + 4 + BLOCK_LEN + VERIFIER_LEN + BLOCK_LEN;

/// Clave derivada de una contraseña, reutilizable para volver a cifrar al guardar.
#[derive(Clone)]
pub(crate) struct Protection {
    spin_count: u32,
    salt: [u8; BLOCK_LEN],
    key: [u8; 32],
}

impl std::fmt::Debug for Protection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protection")
            .field("spin_count", &self.spin_count)
            .finish_non_exhaustive()
    }
}

impl Protection {
    pub(crate) fn new(password: &str, spin_count: u32) -> Result<Self> {
        if spin_count > MAX_SPIN_COUNT {
            return Err(Error::InvalidArgument(format!(
                "spin count {} supera el máximo de {}",
                spin_count, MAX_SPIN_COUNT
            )));
        }
        let salt = random_block();
        Ok(Self {
            spin_count,
            key: derive_key(password, &salt, spin_count),
            salt,
        })
    }

    fn verifier(&self) -> [u8; VERIFIER_LEN] {
        verifier_for(&self.key, &self.salt)
    }

    /// Cifra `plain` y antepone la cabecera del sobre.
    pub(crate) fn seal(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let iv = random_block();
        let ciphertext = aes256_encrypt(&self.key, &iv, plain)?;

        let mut output = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        output.extend_from_slice(ENCRYPTED_MAGIC);
        output.extend_from_slice(&self.spin_count.to_le_bytes());
        output.extend_from_slice(&self.salt);
        output.extend_from_slice(&self.verifier());
        output.extend_from_slice(&iv);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }
}

pub(crate) fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.starts_with(ENCRYPTED_MAGIC)
}

/// Descifra un sobre y devuelve el contenido junto con la protección usada.
pub(crate) fn unseal(bytes: &[u8], password: Option<&str>) -> Result<(Vec<u8>, Protection)> {
    if bytes.len() < HEADER_LEN || !is_encrypted(bytes) {
        return Err(Error::Format(
            "cabecera de paquete cifrado incompleta".to_string(),
        ));
    }
    let password = password.ok_or(Error::IncorrectPassword)?;

    let mut offset = ENCRYPTED_MAGIC.len();
    let spin_count = u32::from_le_bytes(read_array(bytes, &mut offset));
    if spin_count > MAX_SPIN_COUNT {
        return Err(Error::Format(format!(
            "spin count {} fuera de rango en la cabecera cifrada",
            spin_count
        )));
    }
    let salt: [u8; BLOCK_LEN] = read_array(bytes, &mut offset);
    let verifier: [u8; VERIFIER_LEN] = read_array(bytes, &mut offset);
    let iv: [u8; BLOCK_LEN] = read_array(bytes, &mut offset);

    let key = derive_key(password, &salt, spin_count);
    if verifier_for(&key, &salt) != verifier {
        return Err(Error::IncorrectPassword);
    }

    let plain = aes256_decrypt(&key, &iv, &bytes[offset..])?;
    Ok((
        plain,
        Protection {
            spin_count,
            salt,
            key,
        },
    ))
}

fn read_array<const N: usize>(bytes: &[u8], offset: &mut usize) -> [u8; N] {
    let mut out = [0_u8; N];
    out.copy_from_slice(&bytes[*offset..*offset + N]);
    *offset += N;
    out
}

pub(crate) fn derive_key(password: &str, salt: &[u8], spin_count: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    for unit in password.encode_utf16() {
        hasher.update(unit.to_le_bytes());
    }
    let mut hash: [u8; 32] = hasher.finalize().into();

    for round in 0..spin_count {
        let mut hasher = Sha256::new();
        hasher.update(round.to_le_bytes());
        hasher.update(hash);
        hash = hasher.finalize().into();
    }

    hash
}

fn verifier_for(key: &[u8], salt: &[u8]) -> [u8; VERIFIER_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(salt);
    hasher.finalize().into()
}

/// Bloque aleatorio de 16 bytes del generador del sistema operativo.
pub(crate) fn random_block() -> [u8; BLOCK_LEN] {
    let mut block = [0_u8; BLOCK_LEN];
    OsRng.fill_bytes(&mut block);
    block
}

/// AES-256-CBC con relleno PKCS#7.
pub(crate) fn aes256_encrypt(key: &[u8; 32], iv: &[u8; BLOCK_LEN], data: &[u8]) -> Result<Vec<u8>> {
    let mut padded = data.to_vec();
    let padding_len = BLOCK_LEN - (data.len() % BLOCK_LEN);
    padded.extend(std::iter::repeat_n(padding_len as u8, padding_len));

    let len = padded.len();
    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut padded, len)
        .map_err(|_| Error::Format("no se pudo cifrar el contenido".to_string()))?;

    Ok(padded)
}

pub(crate) fn aes256_decrypt(key: &[u8; 32], iv: &[u8; BLOCK_LEN], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(Error::Format(
            "el contenido cifrado no es múltiplo del tamaño de bloque".to_string(),
        ));
    }

    let mut buffer = data.to_vec();
    let cipher = Aes256CbcDec::new(key.into(), iv.into());
    let decrypted = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::Format("no se pudo descifrar el contenido".to_string()))?;

    let padding_len = decrypted.last().copied().unwrap_or(0) as usize;
    if padding_len == 0 || padding_len > BLOCK_LEN || padding_len > decrypted.len() {
        return Err(Error::IncorrectPassword);
    }
    let data_len = decrypted.len() - padding_len;
    if decrypted[data_len..]
        .iter()
        .any(|&byte| byte as usize != padding_len)
    {
        return Err(Error::IncorrectPassword);
    }

    Ok(decrypted[..data_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_content_opens_with_the_same_password() -> Result<()> {
        let protection = Protection::new("docPassword", 16)?;
        let sealed = protection.seal(b"contenido del paquete")?;

        assert!(is_encrypted(&sealed));
        let (plain, reopened) = unseal(&sealed, Some("docPassword"))?;
        assert_eq!(plain, b"contenido del paquete");
        assert_eq!(reopened.key, protection.key);
        Ok(())
    }

    #[test]
    fn wrong_or_missing_password_is_rejected() -> Result<()> {
        let sealed = Protection::new("docPassword", 16)?.seal(b"abc")?;

        assert!(matches!(
            unseal(&sealed, Some("docPassword1")),
            Err(Error::IncorrectPassword)
        ));
        assert!(matches!(unseal(&sealed, None), Err(Error::IncorrectPassword)));
        Ok(())
    }

    #[test]
    fn truncated_header_is_a_format_error() {
        assert!(matches!(
            unseal(b"DSPKENC1\x01", Some("x")),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn oversized_spin_count_in_header_is_rejected_before_hashing() -> Result<()> {
        let mut sealed = Protection::new("docPassword", 4)?.seal(b"abc")?;
        let start = ENCRYPTED_MAGIC.len();
        sealed[start..start + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let began = std::time::Instant::now();
        assert!(matches!(
            unseal(&sealed, Some("docPassword")),
            Err(Error::Format(_))
        ));
        assert!(began.elapsed() < std::time::Duration::from_secs(1));
        Ok(())
    }

    #[test]
    fn oversized_spin_count_cannot_protect() {
        assert!(matches!(
            Protection::new("docPassword", MAX_SPIN_COUNT + 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn random_blocks_differ() {
        assert_ne!(random_block(), random_block());
    }

    #[test]
    fn key_derivation_depends_on_salt_and_spin_count() {
        let salt = [7_u8; BLOCK_LEN];
        let base = derive_key("aw", &salt, 4);
        assert_eq!(base, derive_key("aw", &salt, 4));
        assert_ne!(base, derive_key("aw", &salt, 5));
        assert_ne!(base, derive_key("aw", &[8_u8; BLOCK_LEN], 4));
    }
}
