use serde::Deserialize;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use anyhow::{Context, Result};
use log::error;

pub const DEFAULT_SETTINGS_PATH: &str = "src/resources/settings.yaml";

// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub full_name: String,
    pub email_address: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    /// Send the IMAP `ID` command after login.
    #[serde(default = "default_identify")]
    pub identify: bool,
    pub incoming: ServerConfig,
    pub outgoing: ServerConfig,
}

/// One IMAP or SMTP endpoint.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub user_name: String,
    /// Looked up in the credential store when absent.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub start_ssl: bool,
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_identify() -> bool {
    true
}

pub fn parse_settings(yaml: &str) -> Result<Config> {
    serde_yaml::from_str(yaml).context("Cannot deserialize settings")
}

pub fn load_settings(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        error!("Error: {}", err);
        err
    }).with_context(|| format!("Cannot find settings at {}", path.display()))?;

    let reader = BufReader::new(file);

    // Parse the YAML file into the Config struct
    let config: Config = serde_yaml::from_reader(reader)
        .with_context(|| format!("Cannot deserialize settings from {}", path.display()))?;

    Ok(config)
}
