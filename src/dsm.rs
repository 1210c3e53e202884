//! Client for the Synology DSM web API
//!
//! Only the handful of calls the controller needs are covered: login, the two
//! temperature queries, and reading/setting the fan-speed mode. Every call is
//! blocking with a bounded timeout. Login credentials travel in a POST form
//! body, and transport errors are stripped of their URL before they surface,
//! since query strings carry the session id.

use crate::config::DsmConfig;
use crate::errors::{FanControlError, Result};
use log::{debug, trace};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

const AUTH_PATH: &str = "/webapi/auth.cgi";
const ENTRY_PATH: &str = "/webapi/entry.cgi";

pub const API_AUTH: &str = "SYNO.API.Auth";
pub const API_THERMAL: &str = "SYNO.Core.Hardware.Thermal";
pub const API_SYSTEM: &str = "SYNO.Core.System";
pub const API_FAN_SPEED: &str = "SYNO.Core.Hardware.FanSpeed";

/// An authenticated DSM session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub sid: String,
    /// `SynoToken` sent along with write calls, when DSM handed one out
    pub token: Option<String>,
}

impl Session {
    pub fn new(sid: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

/// The DSM operations the controller depends on
pub trait DsmApi {
    /// Authenticate and open a session
    fn login(&self) -> Result<Session>;

    /// `data` object of the hardware thermal status call
    fn thermal_status(&self, session: &Session) -> Result<Value>;

    /// `data` object of the system info call
    fn system_info(&self, session: &Session) -> Result<Value>;

    /// Fetch the optional `SynoToken` from the fan-speed API
    fn fan_token(&self, session: &Session) -> Result<Option<String>>;

    /// Switch the fan to the named mode
    fn set_fan_mode(&self, session: &Session, mode_name: &str) -> Result<()>;
}

/// Standard DSM response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<i64>,
}

impl Envelope {
    fn into_data(self, api: &str) -> Result<Value> {
        if !self.success {
            return Err(FanControlError::Api {
                api: api.to_string(),
                code: self.error.and_then(|e| e.code),
            });
        }
        Ok(self.data.unwrap_or(Value::Null))
    }
}

/// HTTP implementation of [`DsmApi`]
pub struct DsmClient {
    http: Client,
    host: String,
    username: String,
    password: String,
    session_name: String,
}

impl DsmClient {
    pub fn new(config: &DsmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        if !config.verify_ssl {
            debug!("TLS certificate verification disabled for {}", config.host);
        }

        Ok(Self {
            http,
            host: config.host.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            session_name: config.session_name.clone(),
        })
    }

    fn call(&self, request: RequestBuilder, api: &str) -> Result<Value> {
        let envelope: Envelope = request
            .send()
            .and_then(Response::error_for_status)
            .and_then(|response| response.json::<Envelope>())
            .map_err(reqwest::Error::without_url)?;

        envelope.into_data(api)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn entry(
        &self,
        api: &str,
        method: &str,
        session: &Session,
        extra: &[(&str, &str)],
    ) -> Result<Value> {
        let mut params = vec![
            ("api", api),
            ("version", "1"),
            ("method", method),
            ("_sid", session.sid.as_str()),
        ];
        params.extend_from_slice(extra);

        let url = self.url(ENTRY_PATH);
        trace!("GET {} api={} method={}", url, api, method);
        self.call(self.http.get(&url).query(&params), api)
    }
}

impl DsmApi for DsmClient {
    fn login(&self) -> Result<Session> {
        let params = [
            ("api", API_AUTH),
            ("version", "7"),
            ("method", "login"),
            ("account", self.username.as_str()),
            ("passwd", self.password.as_str()),
            ("session", self.session_name.as_str()),
            ("format", "sid"),
        ];

        let url = self.url(AUTH_PATH);
        trace!("POST {} api={}", url, API_AUTH);
        let data = self
            .call(self.http.post(&url).form(&params), API_AUTH)
            .map_err(|e| FanControlError::Authentication(e.to_string()))?;

        let sid = data
            .get("sid")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                FanControlError::Authentication("login response has no sid".to_string())
            })?;

        debug!("Logged in to {} as {}", self.host, self.username);
        Ok(Session::new(sid))
    }

    fn thermal_status(&self, session: &Session) -> Result<Value> {
        self.entry(API_THERMAL, "status", session, &[])
    }

    fn system_info(&self, session: &Session) -> Result<Value> {
        self.entry(API_SYSTEM, "info", session, &[])
    }

    fn fan_token(&self, session: &Session) -> Result<Option<String>> {
        let data = self.entry(API_FAN_SPEED, "get", session, &[])?;
        Ok(data
            .get("SynoToken")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set_fan_mode(&self, session: &Session, mode_name: &str) -> Result<()> {
        let mut extra = vec![("dual_fan_speed", mode_name)];
        if let Some(token) = session.token.as_deref() {
            extra.push(("SynoToken", token));
        }
        self.entry(API_FAN_SPEED, "set", session, &extra)?;
        Ok(())
    }
}

/// Read a temperature field that DSM may report as a number or a string
pub fn temperature_field(data: &Value, field: &str) -> Option<f64> {
    let value = match data.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}
