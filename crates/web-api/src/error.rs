use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::{DomainError, RepositoryError};

        let status = match &error {
            AppErr::Domain(DomainError::InvalidArgument { .. })
            | AppErr::Domain(DomainError::InvalidContent { .. }) => StatusCode::BAD_REQUEST,
            AppErr::Domain(DomainError::RoomNotFound)
            | AppErr::Domain(DomainError::MessageNotFound)
            | AppErr::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            AppErr::Domain(DomainError::NotAMember)
            | AppErr::Domain(DomainError::NotOwner)
            | AppErr::Domain(DomainError::NotRoomCreator) => StatusCode::FORBIDDEN,
            AppErr::Domain(DomainError::AlreadyDeleted)
            | AppErr::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            AppErr::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppErr::Repository(RepositoryError::Storage { .. }) | AppErr::Infrastructure { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if error.is_internal() {
            tracing::error!(error = %error, "request failed");
            // 不向客户端暴露存储细节
            return ApiError::new(status, error.code(), "internal server error");
        }
        ApiError::new(status, error.code(), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
