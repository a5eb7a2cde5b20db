use crate::db::DatabaseId;
use anyhow::Context;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "QUERYBOT_CONFIG";
pub const ENV_PREFIX: &str = "QUERYBOT_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub databases: DatabasesConfig,
    pub local_llm: LocalLlmConfig,
    pub cloud_llm: CloudLlmConfig,
    pub weather: WeatherConfig,
    pub rbac: RbacConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: "static".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasesConfig {
    pub hospital_url: String,
    pub warehouse_url: String,
    pub pool_size: u32,
    pub default_active: DatabaseId,
}

impl Default for DatabasesConfig {
    fn default() -> Self {
        Self {
            hospital_url: "postgres://querybot:@localhost:5432/hospital_db".to_string(),
            warehouse_url: "postgres://querybot:@localhost:5432/warehouse_db".to_string(),
            pool_size: 5,
            default_active: DatabaseId::Hospital,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLlmConfig {
    pub server_url: String,
    pub model_path: String,
    pub model_name: String,
    pub min_model_bytes: u64,
    pub timeout_secs: u64,
    pub n_predict: u32,
    pub temperature: f32,
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8081".to_string(),
            model_path: "models/qwen2-1_5b-instruct-q4_k_m.gguf".to_string(),
            model_name: "qwen2-1.5b-instruct (GGUF)".to_string(),
            min_model_bytes: 100 * 1024 * 1024,
            timeout_secs: 60,
            n_predict: 512,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudLlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub available_models: Vec<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CloudLlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "deepseek-r1".to_string(),
            available_models: vec![
                "deepseek-r1".to_string(),
                "deepseek-chat".to_string(),
                "gpt-4o-mini".to_string(),
            ],
            timeout_secs: 60,
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            latitude: 39.9042,
            longitude: 116.4074,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    pub policies_file: Option<String>,
}

impl AppConfig {
    /// Defaults, then the TOML file named by `QUERYBOT_CONFIG` (or `querybot.toml`), then
    /// `QUERYBOT_*` environment variables with `__` separating nested keys.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("querybot.toml"));
        Self::figment(Some(path))
            .extract()
            .context("Failed to load configuration")
    }

    pub fn figment(file: Option<PathBuf>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cloud_llm.available_models.is_empty() {
            anyhow::bail!("cloud_llm.available_models must not be empty");
        }
        if !self
            .cloud_llm
            .available_models
            .iter()
            .any(|m| m == &self.cloud_llm.model)
        {
            anyhow::bail!(
                "cloud_llm.model '{}' is not listed in cloud_llm.available_models",
                self.cloud_llm.model
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: AppConfig = AppConfig::figment(None).extract().unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.databases.default_active, DatabaseId::Hospital);
        assert_eq!(config.cloud_llm.model, "deepseek-r1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[databases]
default_active = "warehouse"

[cloud_llm]
model = "gpt-4o-mini"
"#
        )
        .unwrap();

        let config: AppConfig = AppConfig::figment(Some(file.path().to_path_buf()))
            .extract()
            .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.databases.default_active, DatabaseId::Warehouse);
        assert_eq!(config.cloud_llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_validate_rejects_unlisted_model() {
        let mut config = AppConfig::default();
        config.cloud_llm.model = "mystery".to_string();
        assert!(config.validate().is_err());
    }
}
