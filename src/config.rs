use std::path::Path;

use serde_derive::Deserialize;

use crate::cli::Cli;

pub const DEFAULT_SCHEMA: &str = "tuyaSmart";

#[derive(Deserialize, Debug, Default, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Credentials and addressing for the cloud device-status API.
///
/// Every field may be left empty; a missing credential shows up later as a
/// failed login or query rather than as a startup error.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CloudConfig {
    pub access_id: String,
    pub access_secret: String,
    pub endpoint: String,
    pub device_id: String,
    pub email: String,
    pub password: String,
    pub country_code: String,
    pub schema: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            access_id: String::new(),
            access_secret: String::new(),
            endpoint: String::new(),
            device_id: String::new(),
            email: String::new(),
            password: String::new(),
            country_code: String::new(),
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct SpeechConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub alert_text: Option<String>,
    pub queue_capacity: Option<usize>,
    pub drain_timeout_seconds: Option<u64>,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::de::from_str(&contents)?)
    }

    /// Values given on the command line or in the environment win over the file.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        let cloud = &mut self.cloud;
        let overrides = [
            (&mut cloud.access_id, &cli.access_id),
            (&mut cloud.access_secret, &cli.access_secret),
            (&mut cloud.endpoint, &cli.endpoint),
            (&mut cloud.device_id, &cli.device_id),
            (&mut cloud.email, &cli.email),
            (&mut cloud.password, &cli.password),
            (&mut cloud.country_code, &cli.country_code),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                field.clone_from(value);
            }
        }
    }
}
