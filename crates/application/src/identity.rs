//! 外部身份服务的抽象。
//!
//! 注册、登录、令牌签发都不在本系统内，这里只负责把令牌换成调用者身份。

use domain::UserId;

use crate::error::ApplicationError;

/// 经过验证的调用者身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
}

#[cfg_attr(test, mockall::automock)]
pub trait TokenVerifier: Send + Sync {
    /// 校验令牌；失败时返回 [`ApplicationError::Unauthenticated`]
    fn verify(&self, token: &str) -> Result<Principal, ApplicationError>;
}
