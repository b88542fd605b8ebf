//! Wire responses for the register and search operations.

use super::{RegistrationOutcome, SearchOutcome};
use crate::core::matching::Match;
use crate::error::{ErrorKind, ServiceError, SkippedImage};
use serde::{Deserialize, Serialize};

/// Response to a registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_stored: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl From<Result<RegistrationOutcome, ServiceError>> for RegisterResponse {
    fn from(result: Result<RegistrationOutcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: true,
                animal_id: Some(outcome.animal_id.to_string()),
                images_stored: Some(outcome.images_stored),
                skipped: outcome.skipped,
                error: None,
                kind: None,
            },
            Err(e) => Self {
                success: false,
                animal_id: None,
                images_stored: None,
                skipped: skipped_of(&e),
                error: Some(e.to_string()),
                kind: Some(e.kind()),
            },
        }
    }
}

/// Response to a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<Match>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl From<Result<SearchOutcome, ServiceError>> for SearchResponse {
    fn from(result: Result<SearchOutcome, ServiceError>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: true,
                matches: Some(outcome.matches),
                skipped: outcome.skipped,
                error: None,
                kind: None,
            },
            Err(e) => Self {
                success: false,
                matches: None,
                skipped: skipped_of(&e),
                error: Some(e.to_string()),
                kind: Some(e.kind()),
            },
        }
    }
}

fn skipped_of(error: &ServiceError) -> Vec<SkippedImage> {
    match error {
        ServiceError::NoValidImages { skipped } | ServiceError::NoValidFeatures { skipped } => {
            skipped.clone()
        }
        _ => Vec::new(),
    }
}
