//! DNS-rebinding protection for the HTTP transport.

use actix_web::HttpRequest;
use actix_web::http::{StatusCode, header};

use crate::config::HttpConfig;

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Host(String),
    Origin(String),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Host(_) => StatusCode::MISDIRECTED_REQUEST,
            Rejection::Origin(_) => StatusCode::FORBIDDEN,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Rejection::Host(host) => format!("Invalid Host header: {host}"),
            Rejection::Origin(origin) => format!("Invalid Origin header: {origin}"),
        }
    }
}

/// Host and Origin allow-lists.
#[derive(Debug, Clone)]
pub struct HostGuard {
    enabled: bool,
    allowed_hosts: Vec<String>,
    allowed_origins: Vec<String>,
}

impl HostGuard {
    pub fn new(enabled: bool, allowed_hosts: Vec<String>, allowed_origins: Vec<String>) -> Self {
        Self {
            enabled,
            allowed_hosts: normalize(allowed_hosts),
            allowed_origins: normalize(allowed_origins),
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(
            config.dns_rebinding_protection,
            config.allowed_hosts.clone(),
            config.allowed_origins.clone(),
        )
    }

    pub fn check_request(&self, req: &HttpRequest) -> Result<(), Rejection> {
        let headers = req.headers();
        let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
        let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
        self.check(host, origin)
    }

    /// A missing Host is refused; a missing Origin is fine (non-browser clients).
    pub fn check(&self, host: Option<&str>, origin: Option<&str>) -> Result<(), Rejection> {
        if !self.enabled {
            return Ok(());
        }
        let host = host.unwrap_or_default().trim();
        if !self.allowed_hosts.iter().any(|p| matches_pattern(p, host)) {
            return Err(Rejection::Host(host.to_string()));
        }
        if let Some(origin) = origin.map(str::trim) {
            if !self.allowed_origins.is_empty()
                && !self
                    .allowed_origins
                    .iter()
                    .any(|p| matches_pattern(p, origin))
            {
                return Err(Rejection::Origin(origin.to_string()));
            }
        }
        Ok(())
    }
}

fn normalize(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// `base:*` matches `base` with any port or no port at all; anything else must
/// match exactly (case-insensitive).
fn matches_pattern(pattern: &str, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let value = value.to_ascii_lowercase();
    match pattern.strip_suffix(":*") {
        Some(base) => match value.strip_prefix(base) {
            Some("") => true,
            Some(rest) => rest
                .strip_prefix(':')
                .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())),
            None => false,
        },
        None => pattern == value,
    }
}
