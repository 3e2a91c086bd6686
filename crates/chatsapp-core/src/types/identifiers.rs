//! Strongly-typed identifiers.

use crate::error::IdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse a positive numeric identifier, trimming surrounding whitespace.
fn parse_positive(kind: &'static str, input: &str) -> Result<i64, IdError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty { kind });
    }

    let value: i64 = trimmed.parse().map_err(|_| IdError::NotNumeric {
        kind,
        value: trimmed.to_string(),
    })?;

    if value <= 0 {
        return Err(IdError::NotPositive { kind, value });
    }

    Ok(value)
}

/// Strongly-typed user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Create a user ID from a raw backend value.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Validate a raw value received from a client.
    pub fn checked(id: i64) -> Result<Self, IdError> {
        if id <= 0 {
            return Err(IdError::NotPositive {
                kind: "user id",
                value: id,
            });
        }
        Ok(Self(id))
    }

    /// Get the raw value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_positive("user id", s).map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly-typed group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(i64);

impl GroupId {
    /// Create a group ID from a raw backend value.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Validate a raw value received from a client.
    pub fn checked(id: i64) -> Result<Self, IdError> {
        if id <= 0 {
            return Err(IdError::NotPositive {
                kind: "group id",
                value: id,
            });
        }
        Ok(Self(id))
    }

    /// Get the raw value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for GroupId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_positive("group id", s).map(Self)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier as it arrives in a JSON request body.
///
/// Browsers send ids either as numbers or as the string read from a `data-` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    /// Convert into a user ID.
    pub fn into_user_id(self) -> Result<UserId, IdError> {
        match self {
            Self::Number(n) => UserId::checked(n),
            Self::Text(s) => s.parse(),
        }
    }

    /// Convert into a group ID.
    pub fn into_group_id(self) -> Result<GroupId, IdError> {
        match self {
            Self::Number(n) => GroupId::checked(n),
            Self::Text(s) => s.parse(),
        }
    }
}
