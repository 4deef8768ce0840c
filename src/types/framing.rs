//! Physical-layer framing tag attached to telemetry

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Encoding of the raw bytes a data channel produces.
///
/// The platform uses this tag to interpret telemetry payloads. Parsing is
/// permissive: anything unrecognized becomes [`FramingKind::Bitstream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FramingKind {
    /// Unframed bit stream
    #[default]
    Bitstream,
    /// AX.25 packets
    Ax25,
    /// Waterfall images
    Waterfall,
    /// Raw IQ samples
    Iq,
}

impl FramingKind {
    /// Parse a configured framing name, case-insensitively.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "AX.25" | "AX25" => FramingKind::Ax25,
            "IQ" => FramingKind::Iq,
            "WATERFALL" => FramingKind::Waterfall,
            _ => FramingKind::Bitstream,
        }
    }

    /// Canonical name used in configuration files and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            FramingKind::Bitstream => "BITSTREAM",
            FramingKind::Ax25 => "AX.25",
            FramingKind::Waterfall => "WATERFALL",
            FramingKind::Iq => "IQ",
        }
    }
}

impl FromStr for FramingKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(FramingKind::parse(s))
    }
}

impl From<String> for FramingKind {
    fn from(value: String) -> Self {
        FramingKind::parse(&value)
    }
}

impl From<FramingKind> for String {
    fn from(value: FramingKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FramingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
