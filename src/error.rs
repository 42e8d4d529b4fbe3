//! Error taxonomy shared by the planner and its collaborators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rate, speed or similar setting that has to be a positive, finite number.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("{setting} must be positive and finite, got {value}")]
pub struct NonPositiveSetting {
    pub setting: &'static str,
    pub value: f64,
}

impl NonPositiveSetting {
    pub fn check(setting: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(Self { setting, value })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("coordinate ({latitude}, {longitude}) is outside [-90,90]x[-180,180]")]
pub struct InvalidCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Errors returned by a geocoding collaborator for a single address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("address not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("plan deadline passed before the request was sent")]
    DeadlineExceeded,
}

impl GeocodeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeocodeError::RateLimited(_) | GeocodeError::Transient(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            GeocodeError::RateLimited(_) => FailureKind::RateLimited,
            GeocodeError::Transient(_) => FailureKind::Transient,
            GeocodeError::NotFound(_) => FailureKind::NotFound,
            GeocodeError::Malformed(_) => FailureKind::Malformed,
            GeocodeError::DeadlineExceeded => FailureKind::DeadlineExceeded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    RateLimited,
    Transient,
    NotFound,
    Malformed,
    DeadlineExceeded,
}

/// Per-address failure reported by the geocoding gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {reason}")]
pub struct GeocodeFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl GeocodeFailure {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            reason: reason.into(),
        }
    }
}

impl From<GeocodeError> for GeocodeFailure {
    fn from(error: GeocodeError) -> Self {
        Self {
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {code} - {message}")]
    Api { code: String, message: String },

    #[error("invalid routing response: {0}")]
    InvalidResponse(String),

    #[error("no route between some of the waypoints")]
    Unreachable,
}

/// Errors that abort a whole plan build.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "message")]
pub enum PlanError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("clustering constraints cannot be satisfied: {0}")]
    ClusteringInfeasible(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure loading a client directory file.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read client file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse client file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("client id {0} appears more than once")]
    DuplicateId(String),
}

impl PlanError {
    /// Configuration errors fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlanError::Internal(_))
    }
}
