//! Shared test utilities for store and admission integration tests
#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use common::admission::{AdmissionController, AdmissionOptions, ManualClock};
use common::crypto::{KdfParams, KeyEncryptingKey, MachineFingerprint, MasterKeyManager};
use common::store::{Store, StoreConfig};
use tempfile::TempDir;

/// Arbitrary fixed start time for manual clocks
pub const T0: u64 = 1_700_000_000_000;

/// Cheap Argon2 parameters so opening a store stays fast in tests
pub fn fast_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn state_path(dir: &TempDir) -> PathBuf {
    dir.path().join("warden.db")
}

pub fn store_config(path: PathBuf) -> StoreConfig {
    StoreConfig::new(path)
        .with_kdf(fast_kdf())
        .with_debounce(Duration::from_millis(20))
}

/// Key manager for a made-up machine
pub fn keys_for_host(host: &str) -> MasterKeyManager {
    let fingerprint = MachineFingerprint::from_parts(host, "linux", "x86_64");
    MasterKeyManager::new(KeyEncryptingKey::derive(&fingerprint, &fast_kdf()).unwrap())
}

/// Open a store in a fresh temp directory
pub async fn setup_store() -> (Store, TempDir) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(store_config(state_path(&temp_dir)))
        .await
        .unwrap();
    (store, temp_dir)
}

/// Controller driven by a manual clock starting at [`T0`]
pub async fn setup_controller(
    options: AdmissionOptions,
) -> (AdmissionController, ManualClock, TempDir) {
    let (store, temp_dir) = setup_store().await;
    let clock = ManualClock::new(T0);
    let controller = AdmissionController::new(store, options)
        .unwrap()
        .with_clock(clock.clone());
    (controller, clock, temp_dir)
}
