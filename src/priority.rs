//! Group priority: a number that remembers whether the caller expressed it
//! as an integer or a float.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A per-group priority, tagged with whichever representation the caller
/// used so it can be rendered back the same way.
///
/// Ordering compares `Long` against `Long` as integers; any other pairing
/// compares both sides as `f64`. Groups are sorted by priority descending,
/// ties broken by name ascending (see `PermissionGroup::referenced_groups`
/// in `group.rs`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Priority {
    Long(i64),
    Double(f64),
}

impl Priority {
    pub fn as_f64(self) -> f64 {
        match self {
            Priority::Long(n) => n as f64,
            Priority::Double(d) => d,
        }
    }

    /// Parses a priority from its textual form: a signed integer if
    /// possible, otherwise a double.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i64>() {
            return Ok(Priority::Long(n));
        }
        if let Ok(d) = s.parse::<f64>() {
            if d.is_finite() {
                return Ok(Priority::Double(d));
            }
        }
        Err(Error::InvalidPriority(s.to_string()))
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Long(0)
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Priority::Long(a), Priority::Long(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}
impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Priority::Long(a), Priority::Long(b)) => a.cmp(b),
            _ => self.as_f64().total_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Long(n) => write!(f, "{}", n),
            Priority::Double(d) => write!(f, "{}", d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long() {
        assert_eq!(Priority::parse("10").unwrap(), Priority::Long(10));
        assert_eq!(Priority::parse("-3").unwrap(), Priority::Long(-3));
    }

    #[test]
    fn parses_double() {
        assert_eq!(Priority::parse("1.5").unwrap(), Priority::Double(1.5));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Priority::parse("not-a-number").is_err());
    }

    #[test]
    fn long_vs_long_compares_as_integers() {
        assert!(Priority::Long(10) > Priority::Long(2));
    }

    #[test]
    fn mixed_compares_as_doubles() {
        assert!(Priority::Long(10) > Priority::Double(9.9));
        assert!(Priority::Double(10.5) > Priority::Long(10));
    }

    #[test]
    fn display_matches_original_form() {
        assert_eq!(Priority::Long(10).to_string(), "10");
        assert_eq!(Priority::Double(1.5).to_string(), "1.5");
    }
}
