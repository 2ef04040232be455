//! Configuration management for CLI, environment variables, and config files.

use crate::error::{ValidationIssue, VfsError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for debrid-fuse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mount: MountConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub fuse: FuseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the FUSE mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub mount_point: PathBuf,
    pub fs_name: String,
    pub debug_fuse: bool,
}

/// Configuration for the catalog database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Configuration for outbound HTTP range requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub low_speed_limit_kbps: u64,
    pub low_speed_time_seconds: u64,
    pub keepalive: bool,
    pub max_redirects: usize,
    pub user_agent: String,
}

/// Configuration for the streaming read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub readahead_buffer_mb: u64,
    pub url_cache_ttl_minutes: u64,
    pub enable_request_serialization: bool,
    pub max_concurrent_requests_per_file: u32,
    pub read_timeout_seconds: u64,
}

/// Kernel cache TTLs handed to FUSE replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuseConfig {
    pub entry_timeout_seconds: u64,
    pub attr_timeout_seconds: u64,
}

/// Configuration for logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/mnt/debrid"),
            fs_name: "debridfs".to_string(),
            debug_fuse: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://debrid-fuse.db".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            connect_timeout_seconds: 5,
            low_speed_limit_kbps: 10,
            low_speed_time_seconds: 15,
            keepalive: true,
            max_redirects: 5,
            user_agent: concat!("debrid-fuse/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            readahead_buffer_mb: 4,
            url_cache_ttl_minutes: 15,
            enable_request_serialization: true,
            max_concurrent_requests_per_file: 1,
            read_timeout_seconds: 90,
        }
    }
}

impl Default for FuseConfig {
    fn default() -> Self {
        Self {
            entry_timeout_seconds: 300,
            attr_timeout_seconds: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn low_speed_limit_bytes(&self) -> u64 {
        self.low_speed_limit_kbps * 1024
    }

    pub fn low_speed_window(&self) -> Duration {
        Duration::from_secs(self.low_speed_time_seconds)
    }
}

impl StreamingConfig {
    pub fn readahead_bytes(&self) -> u64 {
        self.readahead_buffer_mb * 1024 * 1024
    }

    pub fn url_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.url_cache_ttl_minutes * 60)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }
}

impl FuseConfig {
    pub fn entry_timeout(&self) -> Duration {
        Duration::from_secs(self.entry_timeout_seconds)
    }

    pub fn attr_timeout(&self) -> Duration {
        Duration::from_secs(self.attr_timeout_seconds)
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, VfsError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| VfsError::ConfigRead(e.to_string()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| VfsError::ConfigParse(e.to_string())),
            _ => toml::from_str(&content).map_err(|e| VfsError::ConfigParse(e.to_string())),
        }
    }

    pub fn from_default_locations() -> Result<Self, VfsError> {
        let config_dirs = [
            dirs::config_dir().map(|d| d.join("debrid-fuse/config.toml")),
            Some(PathBuf::from("/etc/debrid-fuse/config.toml")),
            Some(PathBuf::from("./debrid-fuse.toml")),
        ];

        for path in config_dirs.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn merge_from_env(mut self) -> Result<Self, VfsError> {
        if let Ok(val) = std::env::var("DEBRID_FUSE_MOUNT_POINT") {
            self.mount.mount_point = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("DEBRID_FUSE_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("DEBRID_FUSE_READAHEAD_MB") {
            self.streaming.readahead_buffer_mb = val.parse().map_err(|_| {
                VfsError::ConfigParse("DEBRID_FUSE_READAHEAD_MB has invalid format".into())
            })?;
        }
        if let Ok(val) = std::env::var("DEBRID_FUSE_URL_CACHE_TTL_MINUTES") {
            self.streaming.url_cache_ttl_minutes = val.parse().map_err(|_| {
                VfsError::ConfigParse("DEBRID_FUSE_URL_CACHE_TTL_MINUTES has invalid format".into())
            })?;
        }
        if let Ok(val) = std::env::var("DEBRID_FUSE_HTTP_TIMEOUT") {
            self.http.timeout_seconds = val.parse().map_err(|_| {
                VfsError::ConfigParse("DEBRID_FUSE_HTTP_TIMEOUT has invalid format".into())
            })?;
        }
        if let Ok(val) = std::env::var("DEBRID_FUSE_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(self)
    }

    pub fn merge_from_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref mount_point) = cli.mount_point {
            self.mount.mount_point = mount_point.clone();
        }
        if let Some(ref url) = cli.database_url {
            self.database.url = url.clone();
        }
        if cli.debug_fuse {
            self.mount.debug_fuse = true;
        }
        self
    }

    pub fn load() -> Result<Self, VfsError> {
        Self::from_default_locations()?.merge_from_env()
    }

    pub fn load_with_cli(cli: &CliArgs) -> Result<Self, VfsError> {
        let base = match &cli.config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_locations()?,
        };
        Ok(base.merge_from_env()?.merge_from_cli(cli))
    }

    pub fn validate(&self) -> Result<(), VfsError> {
        let mut issues = Vec::new();

        if !self.mount.mount_point.is_absolute() {
            issues.push(ValidationIssue {
                field: "mount.mount_point".to_string(),
                message: "must be an absolute path".to_string(),
            });
        }

        if self.mount.fs_name.is_empty() {
            issues.push(ValidationIssue {
                field: "mount.fs_name".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.database.url.is_empty() {
            issues.push(ValidationIssue {
                field: "database.url".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.streaming.readahead_buffer_mb == 0 {
            issues.push(ValidationIssue {
                field: "streaming.readahead_buffer_mb".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.streaming.max_concurrent_requests_per_file == 0 {
            issues.push(ValidationIssue {
                field: "streaming.max_concurrent_requests_per_file".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.http.timeout_seconds == 0 || self.http.connect_timeout_seconds == 0 {
            issues.push(ValidationIssue {
                field: "http".to_string(),
                message: "timeouts must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            issues.push(ValidationIssue {
                field: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(VfsError::ConfigInvalid(issues))
        }
    }
}

/// Command-line arguments that override configuration values.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub mount_point: Option<PathBuf>,
    pub database_url: Option<String>,
    pub config_file: Option<PathBuf>,
    pub debug_fuse: bool,
}
