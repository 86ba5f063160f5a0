use std::sync::OnceLock;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Base64 of 32 raw bytes. Required by `serve`; redacted in `Debug`.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub notes_encryption_key: Option<SecretString>,

    // logging
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub tokio_console: bool,

    // build
    pub app_version: Option<String>,
    #[serde(default = "default_local")]
    pub source: String,
    #[serde(default = "default_local")]
    pub git_commit: String,
    #[serde(default = "default_local")]
    pub pipeline_id: String,
    #[serde(default = "default_local")]
    pub version: String,
}

fn default_port() -> u16 {
    4000
}

fn default_database_url() -> String {
    "sqlite.db".into()
}

fn default_local() -> String {
    "local".into()
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_url: default_database_url(),
            notes_encryption_key: None,
            log_json: false,
            tokio_console: false,
            app_version: None,
            source: default_local(),
            git_commit: default_local(),
            pipeline_id: default_local(),
            version: default_local(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Self>()
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Loads the environment once. Malformed values (a non-numeric `PORT`) are reported here.
pub fn init() -> crate::Result<&'static Config> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| Config::from_env().unwrap_or_default())
}
