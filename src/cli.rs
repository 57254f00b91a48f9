use std::path::PathBuf;

use clap::Parser;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Optional TOML file with `[cloud]` and `[speech]` tables
    #[arg(env = "PIR_MONITOR_CONFIG", long = "config", value_name = "path")]
    pub config: Option<PathBuf>,

    /// Cloud project access id
    #[arg(env = "ACCESS_ID", long = "access-id", value_name = "id")]
    pub access_id: Option<String>,

    /// Cloud project access secret
    #[arg(
        env = "ACCESS_SECRET",
        long = "access-secret",
        value_name = "secret",
        hide_env_values = true
    )]
    pub access_secret: Option<String>,

    /// Cloud API endpoint, eg. "https://openapi.tuyaus.com"
    #[arg(env = "ENDPOINT", long = "endpoint", value_name = "uri")]
    pub endpoint: Option<String>,

    /// Id of the motion sensor to monitor
    #[arg(env = "DEVICE_ID", long = "device-id", value_name = "id")]
    pub device_id: Option<String>,

    /// Account email used to log in
    #[arg(env = "EMAIL", long = "email", value_name = "email")]
    pub email: Option<String>,

    /// Account password used to log in
    #[arg(
        env = "PASSWORD",
        long = "password",
        value_name = "password",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Account country calling code, eg. "1"
    #[arg(env = "COUNTRY_CODE", long = "country-code", value_name = "code")]
    pub country_code: Option<String>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
