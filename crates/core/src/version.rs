//! Feature versions and version ranges
//!
//! Feature manifests use four-part versions (`major.minor.micro.qualifier`)
//! where missing numeric parts default to zero and the qualifier compares
//! lexically, an empty qualifier sorting first.
//!
//! ## Examples
//!
//! ```rust
//! use featurekit_core::version::{Version, VersionRange};
//!
//! let v = Version::parse("1.2").unwrap();
//! assert_eq!(v.to_string(), "1.2.0");
//!
//! let range = VersionRange::parse("[1.0,2.0)").unwrap();
//! assert!(range.includes(&v));
//! assert!(!range.includes(&Version::parse("2.0.0").unwrap()));
//! ```

use crate::errors::ManifestError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A four-part feature version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub micro: i32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: i32, minor: i32, micro: i32, qualifier: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: qualifier.into(),
        }
    }

    /// Parse a version string such as `1`, `1.0`, `1.0.0` or `1.0.0.qualifier`
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let trimmed = input.trim();
        let invalid = || ManifestError::InvalidVersion {
            value: input.to_string(),
        };
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = trimmed.splitn(4, '.');
        let mut numeric = [0i32; 3];
        for slot in numeric.iter_mut() {
            match parts.next() {
                Some(part) => {
                    *slot = part.parse::<i32>().map_err(|_| invalid())?;
                    if *slot < 0 {
                        return Err(invalid());
                    }
                }
                None => break,
            }
        }
        let qualifier = parts.next().unwrap_or_default().to_string();
        if qualifier
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        {
            return Err(invalid());
        }

        Ok(Self::new(numeric[0], numeric[1], numeric[2], qualifier))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

/// A version range as written in content headers
///
/// A bare version means "at least"; bracketed forms give inclusive (`[`, `]`)
/// or exclusive (`(`, `)`) bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub floor: Version,
    pub floor_inclusive: bool,
    pub ceiling: Option<Version>,
    pub ceiling_inclusive: bool,
}

impl VersionRange {
    /// Range matching every version
    pub fn any() -> Self {
        Self {
            floor: Version::default(),
            floor_inclusive: true,
            ceiling: None,
            ceiling_inclusive: false,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let trimmed = input.trim();
        let invalid = || ManifestError::InvalidVersion {
            value: input.to_string(),
        };

        let Some(first) = trimmed.chars().next() else {
            return Err(invalid());
        };
        if first != '[' && first != '(' {
            return Ok(Self {
                floor: Version::parse(trimmed)?,
                floor_inclusive: true,
                ceiling: None,
                ceiling_inclusive: false,
            });
        }

        let last = trimmed.chars().last().ok_or_else(invalid)?;
        if (last != ']' && last != ')') || trimmed.len() < 2 {
            return Err(invalid());
        }
        let inner = &trimmed[1..trimmed.len() - 1];
        let (low, high) = inner.split_once(',').ok_or_else(invalid)?;
        let floor = Version::parse(low)?;
        let ceiling = Version::parse(high)?;
        if ceiling < floor {
            return Err(invalid());
        }

        Ok(Self {
            floor,
            floor_inclusive: first == '[',
            ceiling: Some(ceiling),
            ceiling_inclusive: last == ']',
        })
    }

    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = match version.cmp(&self.floor) {
            Ordering::Greater => true,
            Ordering::Equal => self.floor_inclusive,
            Ordering::Less => false,
        };
        let below_ceiling = match &self.ceiling {
            None => true,
            Some(ceiling) => match version.cmp(ceiling) {
                Ordering::Less => true,
                Ordering::Equal => self.ceiling_inclusive,
                Ordering::Greater => false,
            },
        };
        above_floor && below_ceiling
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some(ceiling) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' }
            ),
        }
    }
}
