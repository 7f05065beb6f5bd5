//! Sensing-Node Wire Protocol
//!
//! Line-oriented text protocol between the controller (client) and sensing
//! nodes (servers). Each message is one newline-terminated line:
//!
//! ```text
//! controller -> node            node -> controller
//! "Check connection"            "<hostname> is Initialized"
//! "Read"                        "<light_reading> <signal>"
//! "disconnect" (or empty)       "Goodbye"
//! ```
//!
//! The `<signal>` field is an integer whose meaning depends on the node
//! kind: stationary nodes send an occupancy bit, portable nodes send their
//! user's target lux. The controller knows which from its configuration.
//!
//! Anything that fails to parse is a protocol violation; both sides treat
//! it as a disconnect. Encoding uses bounded `heapless` strings so node
//! builds stay allocation-free.

use core::fmt::Write;

use thiserror_no_std::Error;

/// TCP port sensing nodes listen on unless configured otherwise
pub const DEFAULT_PORT: u16 = 1234;

/// Longest hostname a node may announce
pub const MAX_HOSTNAME: usize = 32;

/// Encoded line capacity; fits the longest response with headroom
pub const MAX_LINE: usize = 64;

/// One encoded protocol line, newline not included
pub type Line = heapless::String<MAX_LINE>;

/// Node hostname as announced in the connection check
pub type Hostname = heapless::String<MAX_HOSTNAME>;

/// Protocol failures
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ProtocolError {
    /// Message does not fit the bounded line buffer
    #[error("Message exceeds line capacity")]
    LineTooLong,

    /// Line does not match any message the protocol defines
    #[error("Malformed message: {reason}")]
    Malformed {
        reason: &'static str,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProtocolError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::LineTooLong => defmt::write!(fmt, "Line too long"),
            Self::Malformed { reason } => defmt::write!(fmt, "Malformed: {}", reason),
        }
    }
}

/// Controller-to-node messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Handshake; node answers with its hostname
    CheckConnection,
    /// Ask for the current (light, signal) pair
    Read,
    /// Orderly teardown; an empty line means the same
    Disconnect,
}

impl Request {
    /// Parses a received line; `None` is a protocol violation
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "Check connection" => Some(Self::CheckConnection),
            "Read" => Some(Self::Read),
            "disconnect" | "" => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Wire form of the request, newline not included
    pub fn as_line(&self) -> &'static str {
        match self {
            Self::CheckConnection => "Check connection",
            Self::Read => "Read",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Node-to-controller messages
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Handshake reply carrying the node's hostname
    Initialized(Hostname),
    /// Raw light reading (sensor counts) and the node's signal field
    Reading {
        /// Uncalibrated illuminance reading
        light: f32,
        /// Occupancy bit or target lux, depending on node kind
        signal: i32,
    },
    /// Teardown acknowledgement
    Goodbye,
}

impl Response {
    /// Encodes the response as one line, newline not included
    pub fn encode(&self) -> Result<Line, ProtocolError> {
        let mut line = Line::new();
        match self {
            Self::Initialized(hostname) => {
                write!(line, "{} is Initialized", hostname.as_str())
                    .map_err(|_| ProtocolError::LineTooLong)?;
            }
            Self::Reading { light, signal } => {
                write!(line, "{} {}", light, signal).map_err(|_| ProtocolError::LineTooLong)?;
            }
            Self::Goodbye => {
                line.push_str("Goodbye").map_err(|_| ProtocolError::LineTooLong)?;
            }
        }
        Ok(line)
    }

    /// Parses a received line
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();

        if line == "Goodbye" {
            return Ok(Self::Goodbye);
        }

        if let Some(host) = line.strip_suffix(" is Initialized") {
            let mut hostname = Hostname::new();
            hostname.push_str(host).map_err(|_| ProtocolError::Malformed {
                reason: "hostname too long",
            })?;
            return Ok(Self::Initialized(hostname));
        }

        let mut fields = line.split_whitespace();
        let light = fields
            .next()
            .ok_or(ProtocolError::Malformed {
                reason: "empty reading",
            })?
            .parse::<f32>()
            .map_err(|_| ProtocolError::Malformed {
                reason: "bad light field",
            })?;
        let signal = fields
            .next()
            .ok_or(ProtocolError::Malformed {
                reason: "missing signal field",
            })?
            .parse::<i32>()
            .map_err(|_| ProtocolError::Malformed {
                reason: "bad signal field",
            })?;
        if fields.next().is_some() {
            return Err(ProtocolError::Malformed {
                reason: "trailing fields",
            });
        }

        Ok(Self::Reading { light, signal })
    }
}
