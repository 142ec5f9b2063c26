use maestro_core::MaestroError;
use serde::{Deserialize, Serialize};

/// Machine-readable error body for API callers. Only the stable code and a
/// human-readable message cross the boundary; internals stay internal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Uniform envelope for every externally visible operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn from_error(err: &MaestroError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

impl<T> From<Result<T, MaestroError>> for ApiResponse<T> {
    fn from(result: Result<T, MaestroError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::from_error(&e),
        }
    }
}
