//! Proxy identifiers
//!
//! The engine treats identifiers as opaque strings. Identifiers entering
//! through configuration or the admin API are normalized here first.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RotatorError};

/// Proxy protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks4,
    Socks4a,
    Socks5,
    Socks5h,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            ProxyProtocol::Socks4a => "socks4a",
            ProxyProtocol::Socks5 => "socks5",
            ProxyProtocol::Socks5h => "socks5h",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(ProxyProtocol::Http),
            "https" => Some(ProxyProtocol::Https),
            "socks4" => Some(ProxyProtocol::Socks4),
            "socks4a" => Some(ProxyProtocol::Socks4a),
            "socks5" => Some(ProxyProtocol::Socks5),
            "socks5h" => Some(ProxyProtocol::Socks5h),
            _ => None,
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(
            self,
            ProxyProtocol::Socks4
                | ProxyProtocol::Socks4a
                | ProxyProtocol::Socks5
                | ProxyProtocol::Socks5h
        )
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize a user-supplied proxy into a `scheme://[user:pass@]host:port` identifier
///
/// Accepted forms:
/// - `scheme://[user:pass@]host:port` for any [`ProxyProtocol`]
/// - `host:port`, read as an HTTP proxy
/// - `host:port:user:pass`, read as an authenticated HTTP proxy
pub fn parse_proxy_identifier(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RotatorError::InvalidProxyAddress(
            "empty proxy address".to_string(),
        ));
    }

    if let Some((scheme, _)) = trimmed.split_once("://") {
        let protocol = ProxyProtocol::from_str(scheme)
            .ok_or_else(|| RotatorError::UnsupportedProtocol(scheme.to_string()))?;
        let url = Url::parse(trimmed).map_err(|e| {
            RotatorError::InvalidProxyAddress(format!("'{}': {}", redact(trimmed), e))
        })?;
        if url.host_str().is_none() {
            return Err(RotatorError::InvalidProxyAddress(format!(
                "'{}': missing host",
                redact(trimmed)
            )));
        }
        if url.port().is_none() && protocol.is_socks() {
            return Err(RotatorError::InvalidProxyAddress(format!(
                "'{}': socks proxies need an explicit port",
                redact(trimmed)
            )));
        }
        return Ok(trimmed.to_string());
    }

    parse_short_form(trimmed)
}

/// `host:port[:user:pass]`, with IPv6 hosts in brackets
fn parse_short_form(raw: &str) -> Result<String> {
    let invalid = |detail: &str| {
        RotatorError::InvalidProxyAddress(format!("'{}': {}", redact(raw), detail))
    };

    let (host, rest) = if raw.starts_with('[') {
        let end = raw.find(']').ok_or_else(|| invalid("unclosed '[' in IPv6 host"))?;
        let rest = raw[end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| invalid("expected ':' after IPv6 host"))?;
        (&raw[..=end], rest)
    } else {
        raw.split_once(':').ok_or_else(|| {
            invalid("expected scheme://host:port, host:port or host:port:user:pass")
        })?
    };

    let parts: Vec<&str> = rest.splitn(3, ':').collect();
    let (port, credentials) = match parts.as_slice() {
        [port] => (*port, None),
        [port, user, pass] if !user.is_empty() => (*port, Some((*user, *pass))),
        _ => return Err(invalid("expected host:port or host:port:user:pass")),
    };
    let port = parse_port(port, raw)?;

    if host.is_empty() || host.contains(['/', '?', '#', '@']) {
        return Err(invalid("invalid host"));
    }
    let mut url = Url::parse(&format!("http://{}:{}", host, port))
        .map_err(|e| invalid(&e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| invalid("missing host"))?
        .to_string();

    match credentials {
        None => Ok(format!("http://{}:{}", host, port)),
        Some((user, pass)) => {
            url.set_username(user)
                .and_then(|_| url.set_password(Some(pass)))
                .map_err(|_| invalid("invalid credentials"))?;
            Ok(format!(
                "http://{}:{}@{}:{}",
                url.username(),
                url.password().unwrap_or_default(),
                host,
                port
            ))
        }
    }
}

fn parse_port(port: &str, raw: &str) -> Result<u16> {
    port.parse::<u16>().map_err(|_| {
        RotatorError::InvalidProxyAddress(format!(
            "'{}': invalid port '{}'",
            redact(raw),
            port
        ))
    })
}

/// Mask the password of a proxy identifier for log output
pub fn redact(proxy: &str) -> String {
    let Some((scheme, rest)) = proxy.split_once("://") else {
        return proxy.to_string();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return proxy.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => proxy.to_string(),
    }
}
