use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use common::admission::{AdmissionConfig, AdmissionController, AdmissionOptions, ConfigError};
use common::crypto::KdfParams;
use common::store::{Store, StoreConfig, StoreError, DEFAULT_DEBOUNCE};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "warden";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATE_FILE_NAME: &str = "warden.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Delay used to coalesce store writes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Argon2 cost for the machine key
    #[serde(default)]
    pub kdf: KdfParams,
    /// Limits handed to the admission controller
    #[serde(default = "default_admission")]
    pub admission: AdmissionOptions,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_admission() -> AdmissionOptions {
    AdmissionOptions::new(100, 60_000)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            kdf: KdfParams::default(),
            admission: default_admission(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the warden directory (~/.warden)
    pub warden_dir: PathBuf,
    /// Path to the encrypted state file
    pub state_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the warden directory path (custom or default ~/.warden)
    pub fn warden_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new warden directory.
    ///
    /// The state file is created before the config is written: a failed
    /// init leaves no config behind and can be retried as is.
    pub async fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let warden_dir = Self::warden_dir(custom_path)?;

        let config_path = warden_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        // reject unusable limits before anything is written
        AdmissionConfig::try_from(&config.admission)?;

        fs::create_dir_all(&warden_dir)?;
        let state = Self {
            state_path: warden_dir.join(STATE_FILE_NAME),
            warden_dir,
            config_path,
            config,
        };

        // a foreign-machine state file already in place fails here
        let store = state.open_store().await?;
        store.close().await?;

        let config_toml = toml::to_string_pretty(&state.config)?;
        fs::write(&state.config_path, config_toml)?;
        tracing::info!(dir = %state.warden_dir.display(), "initialized warden directory");

        Ok(state)
    }

    /// Load existing state from the warden directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let warden_dir = Self::warden_dir(custom_path)?;

        if !warden_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = warden_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            state_path: warden_dir.join(STATE_FILE_NAME),
            warden_dir,
            config_path,
            config,
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.state_path.clone())
            .with_debounce(Duration::from_millis(self.config.debounce_ms))
            .with_kdf(self.config.kdf)
    }

    /// Open (or create) the state file for this machine.
    pub async fn open_store(&self) -> Result<Store, StateError> {
        Ok(Store::open(self.store_config()).await?)
    }

    pub fn controller(&self, store: Store) -> Result<AdmissionController, StateError> {
        Ok(AdmissionController::new(store, self.config.admission.clone())?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("warden directory not initialized. Run 'warden init' first")]
    NotInitialized,

    #[error("warden directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid admission config: {0}")]
    Config(#[from] ConfigError),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
