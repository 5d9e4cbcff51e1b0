//! # casfs-config
//!
//! Ambient configuration for CAS-FS components: a `Config` covering the
//! blob store, the default directory codec, and the directory cache size,
//! loaded global-then-project-then-environment.
//!
//! Resolution order:
//! 1. `~/.casbak/config.toml` (global)
//! 2. `<project>/.casbak/config.toml` (project-local, overrides global)
//! 3. `CASBAK_*` environment variables (highest priority)

pub mod logging;
pub mod path;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CAS_ROOT: &str = "~/.casbak/the_source";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub config_version: u32,
    pub storage: StorageConfig,
    pub codec: CodecConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            config_version: CONFIG_VERSION,
            storage: StorageConfig::default(),
            codec: CodecConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load config for a specific backup/project root directory.
    /// Resolution order: global -> project -> env vars.
    pub fn load_for_project(project_root: &Path) -> Result<Self> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let contents = std::fs::read_to_string(&global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        let project_config_path = project_root.join(".casbak").join("config.toml");
        if project_config_path.exists() {
            let contents = std::fs::read_to_string(&project_config_path)?;
            let project_config: Config = toml::from_str(&contents)?;
            config.merge(project_config);
        }

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load() -> Result<Self> {
        Self::load_for_project(Path::new("."))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".casbak").join("config.toml"))
    }

    fn merge(&mut self, other: Config) {
        let default_storage = StorageConfig::default();
        if other.storage.cas_root != default_storage.cas_root {
            self.storage.cas_root = other.storage.cas_root;
        }
        if other.storage.digest_algorithm != default_storage.digest_algorithm {
            self.storage.digest_algorithm = other.storage.digest_algorithm;
        }
        if other.storage.fanout != default_storage.fanout {
            self.storage.fanout = other.storage.fanout;
        }

        let default_codec = CodecConfig::default();
        if other.codec.default_format != default_codec.default_format {
            self.codec.default_format = other.codec.default_format;
        }

        let default_cache = CacheConfig::default();
        if other.cache.ring_size != default_cache.ring_size {
            self.cache.ring_size = other.cache.ring_size;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("CASBAK_CAS_ROOT") {
            self.storage.cas_root = PathBuf::from(root);
        }
        if let Ok(algo) = std::env::var("CASBAK_DIGEST") {
            self.storage.digest_algorithm = algo;
        }
        if let Ok(fanout) = std::env::var("CASBAK_FANOUT") {
            self.storage.fanout = fanout;
        }
        if let Ok(format) = std::env::var("CASBAK_CODEC") {
            self.codec.default_format = format;
        }
        if let Ok(size) = std::env::var("CASBAK_CACHE_SIZE") {
            if let Ok(n) = size.parse() {
                self.cache.ring_size = n;
            }
        }
    }

    /// Generate a human-readable TOML template for `casbak init`.
    pub fn init_toml() -> String {
        let default = Config::default();
        format!(
            r#"# casbak configuration
config_version = 1

[storage]
cas_root = "{cas_root}"
digest_algorithm = "{digest}"
fanout = "{fanout}"

[codec]
default_format = "{codec}"

[cache]
ring_size = {ring_size}
"#,
            cas_root = default.storage.cas_root.display(),
            digest = default.storage.digest_algorithm,
            fanout = default.storage.fanout,
            codec = default.codec.default_format,
            ring_size = default.cache.ring_size,
        )
    }
}

/// Blob store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Canonical CAS storage directory (tilde-expanded at use).
    pub cas_root: PathBuf,
    /// Digest algorithm name: "sha1", "sha256", or "blake3".
    pub digest_algorithm: String,
    /// Fanout pattern, e.g. "1 2".
    pub fanout: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            cas_root: PathBuf::from(DEFAULT_CAS_ROOT),
            digest_algorithm: "sha256".to_string(),
            fanout: "1 2".to_string(),
        }
    }
}

/// Directory codec configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodecConfig {
    /// Default codec used by `commit` for newly-created directories:
    /// "universal", "unix", or "minimal".
    pub default_format: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig { default_format: "universal".to_string() }
    }
}

/// Directory cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Size of the directory cache's strong-reference ring buffer.
    pub ring_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { ring_size: 32 }
    }
}
