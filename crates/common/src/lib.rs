/**
 * Admission control: sliding-window and burst limits,
 *  ban escalation, violation decay and user-agent weighting.
 * Keeps all of its state in a `store::Store`.
 */
pub mod admission;
/**
 * Cryptographic types and operations.
 *  - AES-256-GCM payload encryption
 *  - Machine-bound master key wrapping
 */
pub mod crypto;
/**
 * Encrypted, path-addressed document store with
 *  debounced write-behind persistence.
 */
pub mod store;

pub mod prelude {
    pub use crate::admission::{
        AdmissionController, AdmissionOptions, Decision, PolicyOverride, PolicyRequest, Reason,
    };
    pub use crate::crypto::{KdfParams, MasterKeyManager};
    pub use crate::store::{Store, StoreConfig, StoreError};
}
