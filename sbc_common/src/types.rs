//! Pin vocabulary shared by the HAL and its consumers.
//!
//! - `PinId` - bounded pin index
//! - `Level` - logic level of a digital pin
//! - `Mode` - pin direction
//! - `Edge` - edge selection for interrupts
//! - `PinKind` / `AllocPolicy` - resource record kind and ownership policy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric handle of one general-purpose signal line.
///
/// Range checking against the configured maximum happens in the HAL, not
/// here; a `PinId` is only an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(pub u16);

impl PinId {
    /// Table index of this pin.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for PinId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    /// Logic 0.
    #[default]
    Low,
    /// Logic 1.
    High,
}

impl Level {
    /// Character written to a value node.
    pub fn as_char(self) -> char {
        match self {
            Level::Low => '0',
            Level::High => '1',
        }
    }

    /// Decode a byte read from a value node; only `'0'` is low.
    pub fn from_byte(byte: u8) -> Self {
        if byte == b'0' { Level::Low } else { Level::High }
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Input.
    Input,
    /// Output. On a PWM pin this starts the channel.
    Output,
}

impl Mode {
    /// String written to a direction node.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Input => "in",
            Mode::Output => "out",
        }
    }
}

/// Edge selection for an interrupt registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    /// No edge; disables notifications.
    None,
    /// Low to high transition.
    Rising,
    /// High to low transition.
    Falling,
    /// Any transition.
    Both,
}

impl Edge {
    /// String written to an edge node.
    pub fn as_str(self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }
}

impl std::str::FromStr for Edge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Edge::None),
            "rising" => Ok(Edge::Rising),
            "falling" => Ok(Edge::Falling),
            "both" => Ok(Edge::Both),
            other => Err(format!("unknown edge '{other}'")),
        }
    }
}

/// Kind of a resource record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
    /// Digital input/output.
    Digital,
    /// Hardware PWM channel.
    Pwm,
    /// Reserved; allocation always fails with `Unsupported`.
    Analog,
}

impl fmt::Display for PinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinKind::Digital => "digital",
            PinKind::Pwm => "pwm",
            PinKind::Analog => "analog",
        };
        f.write_str(name)
    }
}

/// Ownership policy for `allocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy {
    /// Fail if the pin is already owned.
    Exclusive,
    /// Alias an existing record and bump its share count.
    Shared,
    /// Succeed whether or not the pin is already owned.
    BestEffort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_decoding_treats_only_zero_as_low() {
        assert_eq!(Level::from_byte(b'0'), Level::Low);
        assert_eq!(Level::from_byte(b'1'), Level::High);
        assert_eq!(Level::from_byte(b'\n'), Level::High);
    }

    #[test]
    fn edge_parses_sysfs_names() {
        for edge in [Edge::None, Edge::Rising, Edge::Falling, Edge::Both] {
            assert_eq!(edge.as_str().parse::<Edge>().unwrap(), edge);
        }
        assert!("sideways".parse::<Edge>().is_err());
    }

    #[test]
    fn mode_strings() {
        assert_eq!(Mode::Input.as_str(), "in");
        assert_eq!(Mode::Output.as_str(), "out");
    }
}
