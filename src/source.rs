//! Parsing of the single `SOURCE` argument into a connection target.
//!
//! Anything containing a colon is a network target (`host:port`,
//! `[v6addr]:port`), `-` is standard input, everything else is a path.

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;

/// Standard secure-MQTT port.
pub const DEFAULT_PORT: u16 = 8883;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Network { host: String, port: u16 },
    File(PathBuf),
    Stdin,
}

impl Source {
    pub fn parse(value: &str) -> Result<Source> {
        if value.is_empty() {
            return Err(Error::Usage("source was empty".into()));
        }

        if value == "-" {
            return Ok(Source::Stdin);
        }

        if !value.contains(':') {
            return Ok(Source::File(PathBuf::from(value)));
        }

        let (host, port) = match value.strip_prefix('[') {
            Some(rest) => {
                let (host, after) = rest.split_once(']').ok_or_else(|| {
                    Error::Usage(format!("unterminated IPv6 literal in '{}'", value))
                })?;
                let port = after.strip_prefix(':').ok_or_else(|| {
                    Error::Usage(format!("expected ':' after IPv6 literal in '{}'", value))
                })?;
                (host, port)
            }
            None => value.split_once(':').unwrap_or((value, "")),
        };

        if host.is_empty() {
            return Err(Error::Usage(format!("missing host name in '{}'", value)));
        }

        let port = if port.is_empty() {
            DEFAULT_PORT
        } else {
            port.parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| Error::Usage(format!("invalid port '{}' in '{}'", port, value)))?
        };

        Ok(Source::Network {
            host: host.to_string(),
            port,
        })
    }
}

/// `host:port`, bracketing IPv6 literals.
pub fn display_target(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Network { host, port } => f.write_str(&display_target(host, *port)),
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Stdin => write!(f, "<stdin>"),
        }
    }
}

// region:    --- Tests


// endregion: --- Tests
