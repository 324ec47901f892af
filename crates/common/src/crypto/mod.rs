//! Cryptographic primitives for the warden state store
//!
//! - **Payload encryption**: AES-256-GCM with a fresh nonce per call, encoded
//!   as a single `base64(iv || tag || ciphertext)` string
//! - **Key wrapping**: the random master key is sealed with a key-encrypting
//!   key derived (Argon2id) from a fingerprint of the current machine
//!
//! # Security Model
//!
//! The master key lives only in process memory. On disk it appears wrapped,
//! as separate `iv`/`tag`/`data` fields. Because the key-encrypting key is
//! bound to `hostname|os|arch`, a state file is unreadable on another host.
//! This is a single machine-bound secret, not a key management system.

pub mod cipher;
mod master_key;

pub use cipher::{decrypt, encrypt, CipherError, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use master_key::{
    KdfParams, KeyEncryptingKey, MachineFingerprint, MasterKey, MasterKeyError, MasterKeyManager,
    WrappedKey,
};
