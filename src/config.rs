use std::env;
use std::fmt;
use std::net::SocketAddr;

use crate::error::{Error, Result};

/// Environment variable holding the `host:port` every accepted connection is
/// relayed to.
pub const DESTINATION_ADDR_ENV: &str = "TCP_RELAY_DESTINATION_ADDR";
/// Address family used when dialing the destination; defaults to `tcp6`.
pub const DIAL_FAMILY_ENV: &str = "TCP_RELAY_DIAL_FAMILY";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct Config {
    pub destination: Destination,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Which resolved addresses of the destination may be dialed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialFamily {
    Any,
    Tcp4,
    Tcp6,
}

impl DialFamily {
    pub fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            DialFamily::Any => true,
            DialFamily::Tcp4 => addr.is_ipv4(),
            DialFamily::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for DialFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DialFamily::Any => "tcp",
            DialFamily::Tcp4 => "tcp4",
            DialFamily::Tcp6 => "tcp6",
        })
    }
}

/// Fixed relay destination in `host:port` form, resolved on every dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    addr: String,
    family: DialFamily,
}

impl Destination {
    pub fn new(addr: impl Into<String>, family: DialFamily) -> Result<Self> {
        let addr = addr.into();
        validate_host_port(&addr)?;
        Ok(Self { addr, family })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn family(&self) -> DialFamily {
        self.family
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.addr)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = lookup(DESTINATION_ADDR_ENV).ok_or_else(|| {
            Error::Config(format!(
                "required environment variable {DESTINATION_ADDR_ENV} is not set"
            ))
        })?;

        let family = match lookup(DIAL_FAMILY_ENV)
            .unwrap_or_else(|| "tcp6".into())
            .to_lowercase()
            .as_str()
        {
            "any" | "tcp" => DialFamily::Any,
            "tcp4" => DialFamily::Tcp4,
            "tcp6" => DialFamily::Tcp6,
            other => {
                return Err(Error::Config(format!(
                    "invalid {DIAL_FAMILY_ENV} '{other}': must be 'any', 'tcp4' or 'tcp6'"
                )))
            }
        };

        let log_format = match lookup(LOG_FORMAT_ENV)
            .unwrap_or_else(|| "json".into())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(Error::Config(format!(
                    "invalid {LOG_FORMAT_ENV} '{other}': must be 'json' or 'pretty'"
                )))
            }
        };

        Ok(Config {
            destination: Destination::new(addr, family)?,
            log_format,
        })
    }
}

fn validate_host_port(addr: &str) -> Result<()> {
    let invalid = |why: &str| Error::Config(format!("invalid {DESTINATION_ADDR_ENV} '{addr}': {why}"));

    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    if host.contains(':') && !addr.starts_with('[') {
        return Err(invalid("IPv6 hosts must be enclosed in brackets"));
    }
    port.parse::<u16>().map_err(|_| invalid("port must be a number between 0 and 65535"))?;

    Ok(())
}
