use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreErrorCode {
    InvalidArgument,
    DataLoss,
    Internal,
    NotFound,
    FailedPrecondition,
    ResourceExhausted,
}

impl StoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorCode::InvalidArgument => "localstore/invalid-argument",
            StoreErrorCode::DataLoss => "localstore/data-loss",
            StoreErrorCode::Internal => "localstore/internal",
            StoreErrorCode::NotFound => "localstore/not-found",
            StoreErrorCode::FailedPrecondition => "localstore/failed-precondition",
            StoreErrorCode::ResourceExhausted => "localstore/resource-exhausted",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreError {
    pub code: StoreErrorCode,
    message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

pub fn invalid_argument(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::InvalidArgument, message)
}

pub fn data_loss(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::DataLoss, message)
}

pub fn internal_error(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Internal, message)
}

pub fn not_found(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::NotFound, message)
}

pub fn failed_precondition(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::FailedPrecondition, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::ResourceExhausted, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = invalid_argument("bad padding");
        assert_eq!(err.to_string(), "bad padding (localstore/invalid-argument)");
    }

    #[test]
    fn code_strings_are_stable() {
        assert_eq!(data_loss("x").code_str(), "localstore/data-loss");
        assert_eq!(not_found("x").code_str(), "localstore/not-found");
    }
}
