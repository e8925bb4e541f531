//! Server configuration, loaded from environment variables
//!
//! Trust anchor sources, in order:
//! - `XSUAA_URL`, `XSUAA_XSAPPNAME`, `XSUAA_VERIFICATION_KEY`, `XSUAA_CLIENT_ID`
//! - the first `xsuaa` binding in `VCAP_SERVICES`
//!
//! `STREAMGATE_AUTH_ENABLED=false` turns authentication off regardless.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use streamgate_core::sessions::DEFAULT_WRITE_TIMEOUT;
use streamgate_core::{LifecycleConfig, TrustAnchor};
use thiserror::Error;

use crate::logging::LogFormat;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

/// Service label of the authorization server binding in `VCAP_SERVICES`
const XSUAA_SERVICE: &str = "xsuaa";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Incomplete trust anchor: {missing} is not set")]
    IncompleteTrustAnchor { missing: &'static str },

    #[error("Failed to parse VCAP_SERVICES: {0}")]
    Vcap(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Whether authentication was asked for (`STREAMGATE_AUTH_ENABLED`)
    pub auth_enabled: bool,
    /// `None` means requests are not authenticated
    pub trust_anchor: Option<TrustAnchor>,
    pub lifecycle: LifecycleConfig,
    pub write_timeout: Duration,
    /// Echoed in `Mcp-Protocol-Version` when the client sends none
    pub protocol_version: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            auth_enabled: true,
            trust_anchor: None,
            lifecycle: LifecycleConfig::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables
    ///
    /// Environment variables:
    /// - `STREAMGATE_BIND`: listen address (default: `127.0.0.1:8080`)
    /// - `STREAMGATE_AUTH_ENABLED`: "true"/"false" (default: "true")
    /// - `STREAMGATE_HEARTBEAT_SECS`: heartbeat interval (default: 30)
    /// - `STREAMGATE_SESSION_TTL_SECS`: absolute session lifetime (default: 3600)
    /// - `STREAMGATE_WRITE_TIMEOUT_SECS`: per-frame write cap (default: 5)
    /// - `STREAMGATE_PROTOCOL_VERSION`: default protocol echo (default: "2025-06-18")
    /// - `STREAMGATE_LOG_FORMAT`: "pretty" or "json" (default: "pretty")
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();

        let bind = parse_var::<SocketAddr>(&env, "STREAMGATE_BIND", None)?
            .unwrap_or_else(|| Self::default().bind);

        let auth_enabled = match env.get("STREAMGATE_AUTH_ENABLED") {
            Some(value) => parse_bool("STREAMGATE_AUTH_ENABLED", value)?,
            None => true,
        };

        let trust_anchor = if auth_enabled {
            trust_anchor_from(&env)?
        } else {
            None
        };

        let heartbeat_secs = parse_secs(&env, "STREAMGATE_HEARTBEAT_SECS", 30)?;
        let lifetime_secs = parse_secs(&env, "STREAMGATE_SESSION_TTL_SECS", 3600)?;
        let write_timeout_secs =
            parse_secs(&env, "STREAMGATE_WRITE_TIMEOUT_SECS", DEFAULT_WRITE_TIMEOUT.as_secs())?;

        let protocol_version = env
            .get("STREAMGATE_PROTOCOL_VERSION")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string());

        let log_format = match env.get("STREAMGATE_LOG_FORMAT") {
            Some(value) => value.parse().map_err(|reason| ConfigError::InvalidValue {
                name: "STREAMGATE_LOG_FORMAT",
                value: value.clone(),
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind,
            auth_enabled,
            trust_anchor,
            lifecycle: LifecycleConfig {
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
                max_lifetime: Duration::from_secs(lifetime_secs),
            },
            write_timeout: Duration::from_secs(write_timeout_secs),
            protocol_version,
            log_format,
        })
    }
}

fn parse_var<T>(
    env: &HashMap<String, String>,
    name: &'static str,
    default: Option<T>,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env.get(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name,
                value: value.clone(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

fn parse_secs(
    env: &HashMap<String, String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let secs = parse_var(env, name, Some(default))?.unwrap_or(default);
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            value: "0".to_string(),
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(secs)
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

/// Credentials block of a VCAP service binding
#[derive(Debug, Deserialize)]
struct XsuaaCredentials {
    url: Option<String>,
    xsappname: Option<String>,
    verificationkey: Option<String>,
    clientid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceBinding {
    credentials: XsuaaCredentials,
}

/// Build the trust anchor from explicit variables, falling back to
/// `VCAP_SERVICES`. `Ok(None)` when neither source names an anchor.
fn trust_anchor_from(env: &HashMap<String, String>) -> Result<Option<TrustAnchor>, ConfigError> {
    let explicit = ["XSUAA_URL", "XSUAA_XSAPPNAME", "XSUAA_VERIFICATION_KEY"]
        .iter()
        .any(|name| env.contains_key(*name));

    let credentials = if explicit {
        XsuaaCredentials {
            url: env.get("XSUAA_URL").cloned(),
            xsappname: env.get("XSUAA_XSAPPNAME").cloned(),
            verificationkey: env.get("XSUAA_VERIFICATION_KEY").cloned(),
            clientid: env.get("XSUAA_CLIENT_ID").cloned(),
        }
    } else {
        match env.get("VCAP_SERVICES") {
            Some(vcap) => match xsuaa_binding(vcap)? {
                Some(credentials) => credentials,
                None => return Ok(None),
            },
            None => return Ok(None),
        }
    };

    let url = credentials
        .url
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::IncompleteTrustAnchor { missing: "XSUAA_URL" })?;
    let app_id = credentials
        .xsappname
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::IncompleteTrustAnchor {
            missing: "XSUAA_XSAPPNAME",
        })?;

    let mut anchor = TrustAnchor::new(url.trim(), app_id.trim());
    if let Some(key) = credentials.verificationkey {
        anchor = anchor.with_verification_key(key);
    }
    if let Some(client_id) = credentials.clientid {
        anchor = anchor.with_client_id(client_id);
    }
    Ok(Some(anchor))
}

/// Credentials of the first `xsuaa` binding, if any
fn xsuaa_binding(vcap: &str) -> Result<Option<XsuaaCredentials>, ConfigError> {
    let mut services: HashMap<String, Vec<ServiceBinding>> =
        serde_json::from_str(vcap).map_err(|e| ConfigError::Vcap(e.to_string()))?;

    Ok(services
        .remove(XSUAA_SERVICE)
        .and_then(|bindings| bindings.into_iter().next())
        .map(|binding| binding.credentials))
}
