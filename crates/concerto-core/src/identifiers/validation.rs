//! Name validation rules shared by every identifier type.

use std::fmt;

/// Maximum length for all identifier types
pub const MAX_NAME_LENGTH: usize = 128;

/// Error type for identifier validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The name is empty
    Empty,
    /// The name has leading or trailing whitespace
    LeadingTrailingWhitespace,
    /// The name contains characters outside the allowed set
    InvalidCharacters { name: String },
    /// The name exceeds the maximum length
    TooLong { length: usize, max: usize },
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Name cannot be empty"),
            Self::LeadingTrailingWhitespace => {
                write!(f, "Name cannot have leading or trailing whitespace")
            }
            Self::InvalidCharacters { name } => write!(
                f,
                "Name '{}' can only contain alphanumeric characters, hyphens, underscores, and dots",
                name
            ),
            Self::TooLong { length, max } => {
                write!(f, "Name too long ({} chars, max {})", length, max)
            }
        }
    }
}

impl std::error::Error for NameError {}

/// Validator for agent, flow, tool and session names.
pub struct NameValidator;

impl NameValidator {
    /// Validate a name.
    ///
    /// - Non-empty, at most [`MAX_NAME_LENGTH`] bytes
    /// - No leading or trailing whitespace
    /// - Only alphanumeric characters, `-`, `_` and `.`
    ///
    /// ```rust
    /// use concerto_core::identifiers::NameValidator;
    ///
    /// assert!(NameValidator::validate("Greeter").is_ok());
    /// assert!(NameValidator::validate("web.search").is_ok());
    /// assert!(NameValidator::validate("").is_err());
    /// assert!(NameValidator::validate("two words").is_err());
    /// ```
    pub fn validate(name: &str) -> Result<&str, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }

        if name != name.trim() {
            return Err(NameError::LeadingTrailingWhitespace);
        }

        if name.len() > MAX_NAME_LENGTH {
            return Err(NameError::TooLong {
                length: name.len(),
                max: MAX_NAME_LENGTH,
            });
        }

        if !name.chars().all(Self::is_valid_char) {
            return Err(NameError::InvalidCharacters {
                name: name.to_string(),
            });
        }

        Ok(name)
    }

    /// Check if a character is valid in a name
    pub fn is_valid_char(c: char) -> bool {
        c.is_alphanumeric() || c == '-' || c == '_' || c == '.'
    }
}
