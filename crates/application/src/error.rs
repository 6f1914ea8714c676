use domain::{DomainError, RepositoryError};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("authentication failed: {0}")]
    Unauthenticated(String),
    #[error("infrastructure error: {message}")]
    Infrastructure {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ApplicationError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        ApplicationError::Unauthenticated(reason.into())
    }

    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure {
            message: message.into(),
            source: None,
        }
    }

    pub fn infrastructure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ApplicationError::Infrastructure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// 面向客户端的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(err) => match err {
                DomainError::InvalidArgument { .. } => "INVALID_ARGUMENT",
                DomainError::InvalidContent { .. } => "INVALID_CONTENT",
                DomainError::RoomNotFound => "ROOM_NOT_FOUND",
                DomainError::NotAMember => "NOT_A_MEMBER",
                DomainError::MessageNotFound => "MESSAGE_NOT_FOUND",
                DomainError::NotOwner => "NOT_OWNER",
                DomainError::AlreadyDeleted => "ALREADY_DELETED",
                DomainError::NotRoomCreator => "NOT_ROOM_CREATOR",
            },
            ApplicationError::Repository(err) => match err {
                RepositoryError::NotFound => "NOT_FOUND",
                RepositoryError::Conflict => "CONFLICT",
                RepositoryError::Storage { .. } => "STORAGE_ERROR",
            },
            ApplicationError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApplicationError::Infrastructure { .. } => "INFRASTRUCTURE_ERROR",
        }
    }

    /// 是否为需要告警的服务端故障
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ApplicationError::Repository(RepositoryError::Storage { .. })
                | ApplicationError::Infrastructure { .. }
        )
    }
}
