//! API error handling
//!
//! Maps the engine's error taxonomy onto the HTTP result classes:
//! validation, rule rejections, state conflicts and policy blocks are 400;
//! missing credentials 401; insufficient scope 403; absent entities 404;
//! store failures surface as an opaque 500.

use agentwallet_types::WalletError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Credential missing or unresolvable
    Unauthorized,
    Wallet(WalletError),
}

/// Wire shape for error responses
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Wallet(err) => match err {
                WalletError::AccessDenied { .. } => StatusCode::FORBIDDEN,
                WalletError::OwnerNotFound { .. }
                | WalletError::AgentNotFound { .. }
                | WalletError::WalletNotFound { .. }
                | WalletError::TransactionNotFound { .. }
                | WalletError::RuleNotFound { .. }
                | WalletError::KillSwitchNotFound { .. }
                | WalletError::PolicyNotFound { .. }
                | WalletError::CrossTransactionNotFound { .. }
                | WalletError::LineageNotFound { .. }
                | WalletError::GroupNotFound { .. } => StatusCode::NOT_FOUND,
                WalletError::Store { .. }
                | WalletError::Serialization { .. }
                | WalletError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Unauthorized => ErrorBody {
                code: "UNAUTHORIZED".to_string(),
                message: "missing or invalid credential".to_string(),
            },
            Self::Wallet(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("internal failure: {err}");
                ErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "internal failure".to_string(),
                }
            }
            Self::Wallet(err) => ErrorBody {
                code: err.error_code().to_string(),
                message: err.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        Self::Wallet(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(WalletError::access_denied("scope")).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(WalletError::WalletNotFound {
                wallet_id: "w".to_string()
            })
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(WalletError::invalid_input("amount", "must be > 0")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(WalletError::store("down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
