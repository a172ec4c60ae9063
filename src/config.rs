use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::workflows::EngineSettings;

pub const CONFIG_FILE_STEM: &str = "achievement-workflow";
pub const ENV_PREFIX: &str = "ACHIEVEMENT_WORKFLOW";

/// Main configuration structure for the achievement workflow service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Database settings
    pub database: DatabaseConfig,
    /// Workflow engine tuning
    pub workflow: WorkflowConfig,
    /// Attachment storage
    pub storage: StorageConfig,
    /// User directory (credentials and advisor assignments)
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or full `EnvFilter` directive
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Upper bound for any single store call
    pub store_timeout_ms: u64,
    /// Length of the student ranking in statistics
    pub top_students: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory attachment files are written to
    pub blob_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryConfig {
    /// TOML file with `[[users]]` entries
    pub path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
            database: DatabaseConfig {
                url: "sqlite://.achievement-workflow/achievements.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            },
            workflow: WorkflowConfig {
                store_timeout_ms: 10_000,
                top_students: 10,
                default_page_size: 10,
                max_page_size: 100,
            },
            storage: StorageConfig {
                blob_dir: PathBuf::from(".achievement-workflow/uploads"),
            },
            directory: DirectoryConfig {
                path: PathBuf::from("users.toml"),
            },
        }
    }
}

impl From<&WorkflowConfig> for EngineSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            top_students: config.top_students,
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size.max(1),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (achievement-workflow.toml)
    /// 3. Environment variables (ACHIEVEMENT_WORKFLOW__SECTION__KEY)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(&format!("{CONFIG_FILE_STEM}.toml")))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings::from(&self.workflow)
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<AppConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = AppConfig::load_env_file();
        AppConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static AppConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
