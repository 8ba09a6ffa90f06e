use crate::dataset::{DataDir, DatasetName};
use crate::error::{Result, ServiceError};
use axum::http::HeaderValue;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
    pub primary: String,
    pub postal_code_mapping: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            primary: "data.csv".to_string(),
            postal_code_mapping: "postalCodeMapping.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: [
                "http://localhost",
                "http://localhost:8000",
                "http://127.0.0.1",
                "http://127.0.0.1:8000",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "csv_data_service.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter port; the exporter is off when unset.
    pub port: Option<u16>,
}

impl Config {
    /// Loads `path` when given, otherwise `config.toml` if it exists, otherwise
    /// defaults. Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `CSV_SERVICE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CSV_SERVICE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CSV_SERVICE_PORT") {
            self.server.port = parse_port("CSV_SERVICE_PORT", &port)?;
        }
        if let Some(dir) = lookup("CSV_SERVICE_DATA_DIR") {
            self.data.dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("CSV_SERVICE_METRICS_PORT") {
            self.metrics.port = Some(parse_port("CSV_SERVICE_METRICS_PORT", &port)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.primary_dataset()?;
        self.mapping_dataset()?;
        self.allowed_origins()?;
        self.bind_addr()?;
        Ok(())
    }

    pub fn data_dir(&self) -> DataDir {
        DataDir::new(self.data.dir.clone())
    }

    pub fn primary_dataset(&self) -> Result<DatasetName> {
        DatasetName::parse(&self.data.primary)
            .map_err(|_| ServiceError::Config(format!("invalid primary dataset '{}'", self.data.primary)))
    }

    pub fn mapping_dataset(&self) -> Result<DatasetName> {
        DatasetName::parse(&self.data.postal_code_mapping).map_err(|_| {
            ServiceError::Config(format!(
                "invalid postal code mapping dataset '{}'",
                self.data.postal_code_mapping
            ))
        })
    }

    pub fn allowed_origins(&self) -> Result<Vec<HeaderValue>> {
        if self.cors.allowed_origins.is_empty() {
            return Err(ServiceError::Config("cors.allowed_origins is empty".to_string()));
        }
        self.cors
            .allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| ServiceError::Config(format!("invalid CORS origin '{}'", origin)))
            })
            .collect()
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| {
                ServiceError::Config(format!(
                    "invalid bind address {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics.port.map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    }
}

fn parse_port(key: &str, raw: &str) -> Result<u16> {
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::Config(format!("{} is not a valid port: '{}'", key, raw)))
}
