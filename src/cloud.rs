use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac as _};
use log::{debug, warn};
use md5::Md5;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;
use serde_json::json;
use sha2::{Digest as _, Sha256};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CloudConfig;

const LOGIN_PATH: &str = "/v1.0/iot-01/associated-users/actions/authorized-login";
const REFRESH_PATH: &str = "/v1.0/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Refresh a token this long before the cloud would reject it.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server replied with status: {0}")]
    Status(StatusCode),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Authentication(String),
}

/// Body of the device status endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Vec<StatusItem>,
    pub code: Option<i64>,
    pub msg: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StatusItem {
    pub code: String,
    pub value: serde_json::Value,
}

impl StatusResponse {
    /// Raw value of the `code` datapoint, if the device reported one.
    ///
    /// A `null` value counts as not reported. Other non-string values are
    /// rendered as JSON text so they still reach the detector (and end up
    /// as `Unknown`).
    pub fn datapoint(&self, code: &str) -> Option<String> {
        let item = self.result.iter().rev().find(|item| item.code == code)?;
        match &item.value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Device status source for the polling loop.
#[async_trait]
pub trait CloudClient: Send {
    async fn get_status(&mut self, device_id: &str) -> Result<StatusResponse, CloudError>;
}

#[derive(Deserialize, Debug)]
struct Envelope<T> {
    success: bool,
    result: Option<T>,
    code: Option<i64>,
    msg: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, CloudError> {
        match (self.success, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(CloudError::Authentication(format!(
                "code {}: {}",
                self.code.unwrap_or_default(),
                self.msg.unwrap_or_else(|| "no message".to_string())
            ))),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
struct TokenResult {
    access_token: String,
    refresh_token: String,
    /// Seconds until `access_token` expires.
    expire_time: u64,
    uid: String,
}

#[derive(Debug, Clone)]
struct Token {
    access_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl Token {
    fn from_result(result: &TokenResult) -> Self {
        Token {
            access_token: result.access_token.clone(),
            refresh_token: result.refresh_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(result.expire_time),
        }
    }

    fn is_stale(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN >= self.expires_at
    }
}

/// Summary of a successful login, for the startup log line.
#[derive(Debug, Clone)]
pub struct LoginSummary {
    pub uid: String,
    pub expires_in: Duration,
}

/// Signed client for the Tuya OpenAPI.
pub struct TuyaClient {
    http: reqwest::Client,
    config: CloudConfig,
    token: Option<Token>,
}

impl TuyaClient {
    pub fn new(config: CloudConfig) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(TuyaClient {
            http,
            config,
            token: None,
        })
    }

    /// Log in with the account credentials and keep the issued token.
    pub async fn connect(&mut self) -> Result<LoginSummary, CloudError> {
        let body = json!({
            "username": self.config.email,
            "password": md5_hex(&self.config.password),
            "country_code": self.config.country_code,
            "schema": self.config.schema,
        });
        let envelope: Envelope<TokenResult> = self
            .request(Method::POST, LOGIN_PATH, Some(&body), None)
            .await?;
        let result = envelope.into_result()?;

        self.token = Some(Token::from_result(&result));
        Ok(LoginSummary {
            uid: result.uid,
            expires_in: Duration::from_secs(result.expire_time),
        })
    }

    async fn refresh(&mut self, refresh_token: &str) -> Result<(), CloudError> {
        let path = format!("{REFRESH_PATH}/{refresh_token}");
        let envelope: Envelope<TokenResult> =
            self.request(Method::GET, &path, None, None).await?;
        let result = envelope.into_result()?;
        self.token = Some(Token::from_result(&result));
        Ok(())
    }

    /// Current access token, refreshing or logging in again when needed.
    async fn access_token(&mut self) -> Result<String, CloudError> {
        if let Some(token) = &self.token {
            if !token.is_stale() {
                return Ok(token.access_token.clone());
            }
            let refresh_token = token.refresh_token.clone();
            debug!("access token expired, refreshing");
            if let Err(err) = self.refresh(&refresh_token).await {
                warn!("token refresh failed: {err}");
                self.token = None;
            }
        }

        if self.token.is_none() {
            debug!("no access token held, logging in");
            self.connect().await?;
        }

        self.token
            .as_ref()
            .map(|token| token.access_token.clone())
            .ok_or_else(|| CloudError::Authentication("no access token issued".to_string()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        access_token: Option<&str>,
    ) -> Result<T, CloudError> {
        let payload = match body {
            Some(body) => serde_json::to_string(body)?,
            None => String::new(),
        };
        let timestamp = chrono::Utc::now().timestamp_millis();
        let access_token = access_token.unwrap_or_default();
        let sign = sign_request(
            &self.config.access_id,
            &self.config.access_secret,
            access_token,
            timestamp,
            &method,
            path,
            &payload,
        )?;

        let url = format!("{}{}", self.config.endpoint.trim_end_matches('/'), path);
        let mut req = self
            .http
            .request(method, url)
            .header("client_id", self.config.access_id.as_str())
            .header("sign", sign)
            .header("sign_method", "HMAC-SHA256")
            .header("t", timestamp.to_string())
            .header("lang", "en");
        if !access_token.is_empty() {
            req = req.header("access_token", access_token);
        }
        if body.is_some() {
            req = req.header(CONTENT_TYPE, "application/json").body(payload);
        }

        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(CloudError::Status(status));
        }
        Ok(res.json::<T>().await?)
    }
}

#[async_trait]
impl CloudClient for TuyaClient {
    async fn get_status(&mut self, device_id: &str) -> Result<StatusResponse, CloudError> {
        let access_token = self.access_token().await?;
        let path = format!("/v1.0/iot-03/devices/{device_id}/status");
        self.request(Method::GET, &path, None, Some(&access_token))
            .await
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

fn sign_request(
    access_id: &str,
    access_secret: &str,
    access_token: &str,
    timestamp: i64,
    method: &Method,
    path: &str,
    payload: &str,
) -> Result<String, CloudError> {
    let content_hash = format!("{:x}", Sha256::digest(payload.as_bytes()));
    let string_to_sign = format!("{method}\n{content_hash}\n\n{path}");
    let message = format!("{access_id}{access_token}{timestamp}{string_to_sign}");

    let mut mac = HmacSha256::new_from_slice(access_secret.as_bytes())
        .map_err(|e| CloudError::Authentication(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(format!("{:X}", mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response() {
        let body = r#"{
            "success": true,
            "t": 1700000000000,
            "result": [
                {"code": "pir", "value": "pir"},
                {"code": "battery_percentage", "value": 87}
            ]
        }"#;
        let res: StatusResponse = serde_json::from_str(body).unwrap();
        assert!(res.success);
        assert_eq!(res.datapoint("pir"), Some("pir".to_string()));
        assert_eq!(res.datapoint("battery_percentage"), Some("87".to_string()));
        assert_eq!(res.datapoint("temp"), None);
    }

    #[test]
    fn test_null_datapoint_is_missing() {
        let body = r#"{
            "success": true,
            "result": [
                {"code": "pir", "value": null},
                {"code": "battery_percentage", "value": 87}
            ]
        }"#;
        let res: StatusResponse = serde_json::from_str(body).unwrap();
        assert_eq!(res.datapoint("pir"), None);
    }

    #[test]
    fn test_failed_status_response() {
        let body = r#"{"success": false, "code": 1010, "msg": "token invalid", "t": 1}"#;
        let res: StatusResponse = serde_json::from_str(body).unwrap();
        assert!(!res.success);
        assert!(res.result.is_empty());
        assert_eq!(res.code, Some(1010));
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex("password"), "5f4dcc3b5aa765d61d8327deb882cf99");
    }

    #[test]
    fn test_sign_request() {
        let sign = sign_request(
            "id123",
            "secret456",
            "",
            1700000000000,
            &Method::GET,
            "/v1.0/token/abc",
            "",
        )
        .unwrap();
        assert_eq!(sign, SIGN_WITHOUT_TOKEN);

        let sign = sign_request(
            "id123",
            "secret456",
            "tok789",
            1700000000000,
            &Method::GET,
            "/v1.0/iot-03/devices/dev1/status",
            "",
        )
        .unwrap();
        assert_eq!(sign, SIGN_WITH_TOKEN);
    }

    #[test]
    fn test_login_envelope_failure() {
        let body = r#"{"success": false, "code": 2406, "msg": "skill id invalid"}"#;
        let envelope: Envelope<TokenResult> = serde_json::from_str(body).unwrap();
        match envelope.into_result() {
            Err(CloudError::Authentication(msg)) => assert!(msg.contains("2406")),
            other => panic!("expected authentication error, got {other:?}"),
        }
    }

    const SIGN_WITHOUT_TOKEN: &str = "6EAD122A6BFDC800309FCCCCA3461A30EE228F9DA90E5066A2BEB2D5C705E4EC";
    const SIGN_WITH_TOKEN: &str = "F9070BFA3416BD72E44D7557274B59E63A624EE1CA8FF33F8D88DF6B1134979C";
}
