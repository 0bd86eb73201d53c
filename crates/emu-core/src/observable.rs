//! Observability trait for inspecting component state.
//!
//! Queries never affect emulation state.

use std::fmt;

/// A dynamically-typed value returned by state queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
}

impl Value {
    /// The value widened to 16 bits; booleans read as 0 or 1.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Value::Bool(v) => v as u16,
            Value::U8(v) => v as u16,
            Value::U16(v) => v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v:#04X}"),
            Value::U16(v) => write!(f, "{v:#06X}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

/// A component whose state can be inspected by name.
pub trait Observable {
    /// Query a specific property by path.
    ///
    /// Paths are hierarchical, separated by dots: `pc`, `a`, `flags.z`.
    /// Returns `None` if the path is not recognised.
    fn query(&self, path: &str) -> Option<Value>;

    /// List all available query paths.
    fn query_paths(&self) -> &'static [&'static str];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_width_of_the_value() {
        assert_eq!(Value::U8(0x0A).to_string(), "0x0A");
        assert_eq!(Value::U16(0x01A2).to_string(), "0x01A2");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }

    #[test]
    fn widening_keeps_the_numeric_value() {
        assert_eq!(Value::U8(0xFF).as_u16(), 0xFF);
        assert_eq!(Value::Bool(true).as_u16(), 1);
    }
}
