//! 令牌认证服务接口
//!
//! 给定 bearer token，返回用户身份或认证失败。核心拿到的是已识别的主体。

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::UserId;

/// 认证错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 令牌无效、过期或格式错误
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// 令牌认证服务接口
#[async_trait]
pub trait AuthService: Send + Sync {
    /// 验证访问令牌并返回用户身份
    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError>;
}
