//! Extraction error types
//!
//! These cover a strategy that could not run at all (bad selector, payload
//! that is not JSON). A strategy that runs and finds nothing returns an empty
//! list instead.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("No valid selectors compiled for {field}: {errors}")]
    NoSelectors { field: String, errors: String },

    #[error("Malformed payload from {origin}: {reason}")]
    MalformedPayload { origin: String, reason: String },
}

impl ParsingError {
    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed_payload(origin: &str, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            origin: origin.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
