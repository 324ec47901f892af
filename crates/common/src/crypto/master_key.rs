//! Machine-bound master key wrapping
//!
//! The store encrypts its document with a random [`MasterKey`]. That key is
//! never written in clear: it is wrapped with a [`KeyEncryptingKey`] derived
//! through Argon2id from a fingerprint of the current machine
//! (`hostname|os|arch`) and a fixed salt. A state file copied to another host
//! therefore fails to unwrap with [`CipherError::Integrity`].
//!
//! # Portability
//!
//! The fingerprint uses Rust target names from [`std::env::consts`]
//! (`linux`, `macos`, `x86_64`, `aarch64`) and the key is stretched with
//! Argon2id. State files written by other secure-store implementations,
//! even on the same machine, do not unwrap here and vice versa.

use std::ops::Deref;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::cipher::{self, CipherError, KEY_SIZE};

/// Fixed salt for key-encrypting key derivation.
const KEK_SALT: &[u8] = b"secure-store";

/// Errors that can occur while deriving or unwrapping keys
#[derive(Debug, thiserror::Error)]
pub enum MasterKeyError {
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("failed to generate random bytes: {0}")]
    Rng(getrandom::Error),
}

/// Argon2id cost parameters used to derive the key-encrypting key.
///
/// Defaults follow the Argon2 crate defaults (19 MiB, 2 passes, 1 lane).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    Params::DEFAULT_M_COST
}

fn default_iterations() -> u32 {
    Params::DEFAULT_T_COST
}

fn default_parallelism() -> u32 {
    Params::DEFAULT_P_COST
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

/// Stable identity of the host the store runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineFingerprint(String);

impl MachineFingerprint {
    /// Fingerprint of the current machine: `hostname|os|arch`.
    pub fn current() -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Self::from_parts(&hostname, std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_parts(hostname: &str, platform: &str, arch: &str) -> Self {
        Self(format!("{}|{}|{}", hostname, platform, arch))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// A 256-bit document encryption key (zeroized on drop).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

impl Deref for MasterKey {
    type Target = [u8; KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for MasterKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        MasterKey(bytes)
    }
}

impl MasterKey {
    /// Generate a new random key using the system RNG
    pub fn generate() -> Result<Self, MasterKeyError> {
        let mut buff = [0u8; KEY_SIZE];
        getrandom::getrandom(&mut buff).map_err(MasterKeyError::Rng)?;
        Ok(Self(buff))
    }

    fn from_slice(data: &[u8]) -> Result<Self, MasterKeyError> {
        if data.len() != KEY_SIZE {
            return Err(CipherError::Integrity("unwrapped key has the wrong size").into());
        }
        let mut buff = [0u8; KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(Self(buff))
    }
}

/// Key derived from the machine fingerprint, used only to wrap the master key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyEncryptingKey([u8; KEY_SIZE]);

impl std::fmt::Debug for KeyEncryptingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyEncryptingKey(..)")
    }
}

impl Deref for KeyEncryptingKey {
    type Target = [u8; KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl KeyEncryptingKey {
    /// Derive a key deterministically with Argon2id.
    pub fn derive(
        fingerprint: &MachineFingerprint,
        params: &KdfParams,
    ) -> Result<Self, MasterKeyError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| MasterKeyError::Derivation(format!("invalid argon2 params: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(fingerprint.as_bytes(), KEK_SALT, &mut key)
            .map_err(|e| MasterKeyError::Derivation(format!("argon2 failed: {e}")))?;

        Ok(Self(key))
    }
}

/// A wrapped master key as it appears under `_meta.key` in the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub iv: String,
    pub tag: String,
    pub data: String,
}

/// Wraps and unwraps master keys for one machine.
///
/// Holds the derived key-encrypting key so the (deliberately slow) derivation
/// runs once per store rather than once per flush.
#[derive(Debug, Clone)]
pub struct MasterKeyManager {
    kek: KeyEncryptingKey,
}

impl MasterKeyManager {
    pub fn new(kek: KeyEncryptingKey) -> Self {
        Self { kek }
    }

    /// Derive the key-encrypting key for the current machine.
    pub fn for_this_machine(params: &KdfParams) -> Result<Self, MasterKeyError> {
        let fingerprint = MachineFingerprint::current();
        Ok(Self::new(KeyEncryptingKey::derive(&fingerprint, params)?))
    }

    /// Wrap a master key. A fresh iv is drawn on every call.
    pub fn wrap(&self, key: &MasterKey) -> Result<WrappedKey, MasterKeyError> {
        let sealed = cipher::seal_detached(key.as_slice(), &self.kek)?;
        Ok(WrappedKey {
            iv: STANDARD.encode(sealed.iv),
            tag: STANDARD.encode(sealed.tag),
            data: STANDARD.encode(&sealed.data),
        })
    }

    /// Recover a master key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Integrity`] if any field is not valid base64, the
    /// tag does not verify (foreign machine or corrupted file), or the
    /// recovered key is not 256 bits.
    pub fn unwrap(&self, wrapped: &WrappedKey) -> Result<MasterKey, MasterKeyError> {
        let decode = |field: &str| {
            STANDARD
                .decode(field)
                .map_err(|_| CipherError::Integrity("wrapped key is not valid base64"))
        };
        let iv = decode(&wrapped.iv)?;
        let tag = decode(&wrapped.tag)?;
        let data = decode(&wrapped.data)?;

        let mut raw = cipher::open_detached(&iv, &tag, &data, &self.kek)?;
        let key = MasterKey::from_slice(&raw);
        raw.zeroize();
        key
    }

    /// Generate a fresh master key.
    pub fn generate(&self) -> Result<MasterKey, MasterKeyError> {
        MasterKey::generate()
    }
}
