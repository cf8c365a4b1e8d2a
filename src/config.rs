use crate::constants;
use crate::error::{EtlError, Result};
use crate::pipeline::processing::missing::MissingValueStrategy;
use crate::pipeline::processing::normalize::locations::AliasTable;
use crate::pipeline::processing::quality_gate::ValidationRules;
use crate::pipeline::storage::sqlite::IfExists;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Process-wide settings, loaded once at startup and passed by reference.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub fields: FieldsConfig,
    pub alias_table: AliasTable,
    pub validation: ValidationRules,
    pub missing_values: MissingValuesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub csv_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub html_url: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(constants::DEFAULT_DATA_DIR),
            output_dir: PathBuf::from(constants::DEFAULT_OUTPUT_DIR),
            log_dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
            csv_path: None,
            json_path: None,
            api_url: Some(constants::DEFAULT_API_URL.to_string()),
            html_url: Some(constants::DEFAULT_HTML_URL.to_string()),
        }
    }
}

impl PathsConfig {
    pub fn csv_path(&self) -> PathBuf {
        self.csv_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(constants::DEFAULT_CSV_FILE))
    }

    pub fn json_path(&self) -> PathBuf {
        self.json_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(constants::DEFAULT_JSON_FILE))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; relative paths resolve against `paths.output_dir`
    pub path: PathBuf,
    pub cases_table: String,
    pub hospitals_table: String,
    pub vaccinations_table: String,
    pub web_table: String,
    pub if_exists: IfExists,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(constants::DEFAULT_DB_FILE),
            cases_table: constants::CASES_TABLE.to_string(),
            hospitals_table: constants::HOSPITALS_TABLE.to_string(),
            vaccinations_table: constants::VACCINATIONS_TABLE.to_string(),
            web_table: constants::WEB_TABLE.to_string(),
            if_exists: IfExists::Replace,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    pub date_fields: Vec<String>,
    pub location_fields: Vec<String>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            date_fields: constants::DATE_FIELDS.iter().map(|s| s.to_string()).collect(),
            location_fields: constants::LOCATION_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MissingValuesConfig {
    pub strategy: MissingValueStrategy,
}

impl Config {
    /// Resolve the config file: explicit path, then `COVID_ETL_CONFIG`, then
    /// `config.toml` in the working directory. No file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(constants::CONFIG_ENV_VAR).ok().map(PathBuf::from);
        let candidate = explicit.map(Path::to_path_buf).or(from_env);

        match candidate {
            Some(path) => Self::load_from(&path),
            None => {
                let default_path = Path::new("config.toml");
                if default_path.exists() {
                    Self::load_from(default_path)
                } else {
                    info!("No config file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            self.paths.output_dir.join(&self.database.path)
        }
    }
}
