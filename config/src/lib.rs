//! Configuration for the chat memory store.
//!
//! The only environment input is `CHATMEM_DATA_DIR`, which picks the directory
//! holding the database. An optional TOML file can set the same directory and
//! the session cache capacity:
//!
//! ```toml
//! [storage]
//! data_dir = "~/.local/share/chatmem"
//!
//! [cache]
//! capacity = 256   # 0 = unbounded
//! ```
//!
//! Resolution order for the data directory: environment variable, config
//! file, current working directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CHATMEM_DATA_DIR";

/// Fixed database file name inside the data directory.
pub const DB_FILE_NAME: &str = "chat-memory.sqlite";

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// On-disk config file shape. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub storage: Option<StorageConfig>,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the database. `~/` expands to the home directory.
    pub data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CacheConfig {
    /// Maximum sessions kept in the process cache. 0 = unbounded.
    pub capacity: Option<usize>,
}

/// Resolved settings used to construct a memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub data_dir: PathBuf,
    pub cache_capacity: usize,
}

impl MemoryConfig {
    /// Resolve from the environment and the default config file.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match config_path() {
            Some(path) => load_file(&path)?,
            None => None,
        };
        let env_dir = std::env::var(DATA_DIR_ENV).ok();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Ok(Self::resolve(file.as_ref(), env_dir.as_deref(), cwd))
    }

    /// Pure resolution over already-gathered inputs.
    #[must_use]
    pub fn resolve(file: Option<&ConfigFile>, env_dir: Option<&str>, cwd: PathBuf) -> Self {
        let file_dir = file
            .and_then(|f| f.storage.as_ref())
            .and_then(|s| s.data_dir.as_deref());

        let data_dir = env_dir
            .filter(|dir| !dir.trim().is_empty())
            .or(file_dir.filter(|dir| !dir.trim().is_empty()))
            .map_or(cwd, expand_home);

        let cache_capacity = file
            .and_then(|f| f.cache.as_ref())
            .and_then(|c| c.capacity)
            .unwrap_or(DEFAULT_CACHE_CAPACITY);

        Self {
            data_dir,
            cache_capacity,
        }
    }

    /// A config rooted at `data_dir` with default cache settings.
    #[must_use]
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Read and parse a config file. A missing file is `Ok(None)`.
pub fn load_file(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!("Failed to read config at {:?}: {}", path, err);
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: err,
            });
        }
    };

    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chatmem").join("config.toml"))
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}
