//! Validated platform handle.

use std::fmt;

use thiserror::Error;

pub const MAX_SUBJECT_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("Username cannot be empty")]
    Empty,
    #[error("Username must be at most {MAX_SUBJECT_LEN} characters")]
    TooLong,
    #[error("Username may only contain letters, digits and underscores")]
    InvalidCharacters,
}

/// A username that has been trimmed, stripped of a leading `@` and checked
/// against `[A-Za-z0-9_]{1,15}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    pub fn parse(raw: &str) -> Result<Self, SubjectError> {
        let trimmed = raw.trim();
        let handle = trimmed.strip_prefix('@').unwrap_or(trimmed);

        if handle.is_empty() {
            return Err(SubjectError::Empty);
        }
        if handle.chars().count() > MAX_SUBJECT_LEN {
            return Err(SubjectError::TooLong);
        }
        if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SubjectError::InvalidCharacters);
        }
        Ok(Self(handle.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
