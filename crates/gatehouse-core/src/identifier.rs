//! Member identifier parsing.

use std::fmt::{self, Display, Formatter};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

static MEMBER_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[0-9]{8}$").expect("member id pattern is valid")
});

/// Eight-digit membership code a member supplies to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberId(String);

impl MemberId {
    /// Parse and validate a raw identifier. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidIdentifier`] unless the trimmed input is
    /// exactly eight ASCII digits.
    pub fn parse(raw: &str) -> GateResult<Self> {
        let trimmed = raw.trim();
        if MEMBER_ID_PATTERN.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(GateError::InvalidIdentifier {
                value: raw.to_string(),
            })
        }
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MemberId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for MemberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MemberId {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemberId> for String {
    fn from(value: MemberId) -> Self {
        value.0
    }
}

/// Split bulk input on newlines and commas, yielding trimmed non-empty tokens.
pub fn split_bulk(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_eight_digits_and_trims() -> GateResult<()> {
        let id = MemberId::parse(" 30412345\t")?;
        assert_eq!(id.as_str(), "30412345");
        Ok(())
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in [
            "", "1234567", "123456789", "1234567a", "１２３４５６７８", "12 34567", "-1234567",
        ] {
            let err = MemberId::parse(raw).unwrap_err();
            assert!(
                matches!(err, GateError::InvalidIdentifier { .. }),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn split_bulk_handles_lines_and_commas() {
        let tokens: Vec<_> = split_bulk("11111111, 22222222\n\n 33333333 ,bad,\r\n44444444").collect();
        assert_eq!(
            tokens,
            vec!["11111111", "22222222", "33333333", "bad", "44444444"]
        );
    }

    #[test]
    fn serde_round_trip_validates() {
        let parsed: Result<MemberId, _> = serde_json::from_str("\"12345678\"");
        assert!(parsed.is_ok());
        let rejected: Result<MemberId, _> = serde_json::from_str("\"nope\"");
        assert!(rejected.is_err());
    }
}
