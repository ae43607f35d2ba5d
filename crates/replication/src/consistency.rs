//! Write consistency levels.
//!
//! A consistency level decides how many of the ring's candidate nodes must
//! accept an upload before it is committed to metadata. Fewer successes
//! than required roll the upload back.
//!
//! | level    | required stores (n candidates) |
//! |----------|--------------------------------|
//! | `One`    | 1                              |
//! | `Quorum` | n / 2 + 1                      |
//! | `All`    | n                              |

use std::fmt;
use std::str::FromStr;

use crate::ReplicationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsistencyLevel {
    /// Any single replica. Favors availability over durability.
    #[default]
    One,
    /// A strict majority of the candidates.
    Quorum,
    /// Every candidate.
    All,
}

impl ConsistencyLevel {
    /// Minimum successful stores out of `candidates` attempted.
    ///
    /// Never less than one: an upload that stored nothing is never accepted.
    pub fn required(&self, candidates: usize) -> usize {
        let required = match self {
            ConsistencyLevel::One => 1,
            ConsistencyLevel::Quorum => candidates / 2 + 1,
            ConsistencyLevel::All => candidates,
        };
        required.max(1)
    }

    pub fn is_satisfied(&self, candidates: usize, stored: usize) -> bool {
        stored >= self.required(candidates)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::One => "one",
            ConsistencyLevel::Quorum => "quorum",
            ConsistencyLevel::All => "all",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one" => Ok(ConsistencyLevel::One),
            "quorum" => Ok(ConsistencyLevel::Quorum),
            "all" => Ok(ConsistencyLevel::All),
            other => Err(ReplicationError::InvalidArgument(format!(
                "unknown consistency level {:?} (expected one, quorum or all)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_counts() {
        assert_eq!(ConsistencyLevel::One.required(3), 1);
        assert_eq!(ConsistencyLevel::Quorum.required(1), 1);
        assert_eq!(ConsistencyLevel::Quorum.required(2), 2);
        assert_eq!(ConsistencyLevel::Quorum.required(3), 2);
        assert_eq!(ConsistencyLevel::Quorum.required(5), 3);
        assert_eq!(ConsistencyLevel::All.required(3), 3);
        assert_eq!(ConsistencyLevel::All.required(0), 1);
    }

    #[test]
    fn test_is_satisfied() {
        assert!(ConsistencyLevel::One.is_satisfied(2, 1));
        assert!(!ConsistencyLevel::One.is_satisfied(2, 0));
        assert!(!ConsistencyLevel::Quorum.is_satisfied(3, 1));
        assert!(ConsistencyLevel::Quorum.is_satisfied(3, 2));
        assert!(!ConsistencyLevel::All.is_satisfied(3, 2));
    }

    #[test]
    fn test_parse() {
        assert_eq!("one".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::One);
        assert_eq!(" QUORUM ".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::Quorum);
        assert_eq!("all".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::All);
        assert!("most".parse::<ConsistencyLevel>().is_err());
        assert_eq!(ConsistencyLevel::default().to_string(), "one");
    }
}
