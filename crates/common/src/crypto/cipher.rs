//! Payload encryption using AES-256-GCM
//!
//! Every call to [`encrypt`] draws a fresh 96-bit nonce from the system RNG. The
//! encoded blob is `base64(nonce (12 bytes) || tag (16 bytes) || ciphertext)`,
//! which is the layout the durable state file stores under `payload`.
//!
//! Key wrapping uses the same primitive but keeps the three parts apart
//! (see [`seal_detached`] / [`open_detached`]), because the wrapped key is
//! stored as separate `iv`/`tag`/`data` fields.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Key, Nonce, Tag,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;
/// Size of an AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of an AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Authentication failed or the blob could not be decoded.
    /// No plaintext is ever returned alongside this error.
    #[error("integrity check failed: {0}")]
    Integrity(&'static str),
    #[error("failed to generate nonce: {0}")]
    Rng(getrandom::Error),
}

/// The three parts of an AES-GCM seal, kept apart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
    pub data: Vec<u8>,
}

fn cipher_for(key: &[u8; KEY_SIZE]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
}

fn random_nonce() -> Result<[u8; NONCE_SIZE], CipherError> {
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce).map_err(CipherError::Rng)?;
    Ok(nonce)
}

/// Encrypt `plaintext` under `key`, returning the parts separately.
pub fn seal_detached(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> Result<Sealed, CipherError> {
    let iv = random_nonce()?;
    let mut data = plaintext.to_vec();
    let tag = cipher_for(key)
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut data)
        .map_err(|_| CipherError::Integrity("encrypt error"))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(Sealed {
        iv,
        tag: tag_bytes,
        data,
    })
}

/// Decrypt a detached seal. Fails with [`CipherError::Integrity`] when the
/// tag does not verify or the iv/tag have the wrong length.
pub fn open_detached(
    iv: &[u8],
    tag: &[u8],
    data: &[u8],
    key: &[u8; KEY_SIZE],
) -> Result<Vec<u8>, CipherError> {
    if iv.len() != NONCE_SIZE {
        return Err(CipherError::Integrity("invalid iv length"));
    }
    if tag.len() != TAG_SIZE {
        return Err(CipherError::Integrity("invalid tag length"));
    }

    let mut buffer = data.to_vec();
    cipher_for(key)
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| CipherError::Integrity("authentication tag mismatch"))?;

    Ok(buffer)
}

/// Encrypt `plaintext` and encode it as `base64(iv || tag || ciphertext)`.
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> Result<String, CipherError> {
    let sealed = seal_detached(plaintext, key)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + sealed.data.len());
    out.extend_from_slice(&sealed.iv);
    out.extend_from_slice(&sealed.tag);
    out.extend_from_slice(&sealed.data);

    Ok(STANDARD.encode(out))
}

/// Decode and decrypt a blob produced by [`encrypt`].
pub fn decrypt(blob: &str, key: &[u8; KEY_SIZE]) -> Result<Vec<u8>, CipherError> {
    let raw = STANDARD
        .decode(blob.trim())
        .map_err(|_| CipherError::Integrity("payload is not valid base64"))?;

    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::Integrity("payload too short"));
    }

    let (iv, rest) = raw.split_at(NONCE_SIZE);
    let (tag, data) = rest.split_at(TAG_SIZE);
    open_detached(iv, tag, data, key)
}
