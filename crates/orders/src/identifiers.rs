//! Operator-facing identifiers (tracking ids, part numbers).
//!
//! Both are normalised the same way: surrounding whitespace is trimmed and the
//! remainder is compared byte-for-byte (case-sensitive). Blank input is rejected.

use serde::{Deserialize, Deserializer, Serialize};

use shipcheck_core::{DomainError, DomainResult};

macro_rules! normalized_identifier {
    ($t:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            /// Trim `raw` and reject it if nothing is left.
            pub fn parse(raw: &str) -> DomainResult<Self> {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::validation(concat!($label, " must not be blank")));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

normalized_identifier!(TrackingId, "tracking id");
normalized_identifier!(PartNumber, "part number");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let p = PartNumber::parse("  A1\t").unwrap();
        assert_eq!(p.as_str(), "A1");
    }

    #[test]
    fn comparison_is_case_sensitive() {
        assert_ne!(PartNumber::parse("a1").unwrap(), PartNumber::parse("A1").unwrap());
    }

    #[test]
    fn blank_is_rejected() {
        let err = TrackingId::parse("   ").unwrap_err();
        assert_eq!(err, DomainError::validation("tracking id must not be blank"));
    }

    #[test]
    fn deserialize_normalises() {
        let t: TrackingId = serde_json::from_str("\" TRK-9 \"").unwrap();
        assert_eq!(t.as_str(), "TRK-9");
        assert!(serde_json::from_str::<TrackingId>("\"\"").is_err());
    }
}
