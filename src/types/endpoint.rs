// ABOUTME: Network endpoint of a single task instance in a target pool.
// ABOUTME: Parses "host:port" strings and serializes back to the same form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseEndpointError {
    #[error("endpoint cannot be empty")]
    Empty,

    #[error("endpoint '{0}' is missing a port")]
    MissingPort(String),

    #[error("invalid port in endpoint: {0}")]
    InvalidPort(String),

    #[error("endpoint '{0}' is missing a host")]
    MissingHost(String),
}

/// Address of one live task behind a target pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseEndpointError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseEndpointError::Empty);
        }

        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| ParseEndpointError::MissingPort(input.to_string()))?;

        // Bracketed IPv6 literals keep their brackets in the host part.
        if host.is_empty() || host == "[]" {
            return Err(ParseEndpointError::MissingHost(input.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| ParseEndpointError::InvalidPort(port.to_string()))?;

        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ParseEndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Endpoint::parse(&s).map_err(serde::de::Error::custom)
    }
}
