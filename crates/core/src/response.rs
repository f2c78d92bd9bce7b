use std::error::Error;
use std::fmt;

use serde::Serialize;

/// Error half of a [`DatabaseResponse`]. `message` is meant to be shown to
/// the user as is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ResponseError {
    pub fn from_error(err: &dyn Error) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\ncaused by: ")),
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ResponseError {}

/// Uniform result shape handed across the IPC boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl<T> DatabaseResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(data: T, err: &dyn Error) -> Self {
        Self {
            success: false,
            data,
            error: Some(ResponseError::from_error(err)),
        }
    }

    pub fn into_result(self) -> Result<T, ResponseError> {
        match self.error {
            Some(err) if !self.success => Err(err),
            _ => Ok(self.data),
        }
    }
}

impl<T: Default, E: Error> From<Result<T, E>> for DatabaseResponse<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failure(T::default(), &err),
        }
    }
}
