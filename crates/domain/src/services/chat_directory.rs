//! 会话成员目录接口
//!
//! 权威的参与者列表在外部存储中。核心只在连接建立时查询一次，
//! 并在连接生命周期内信任该结果。

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::{ChatId, UserId};

/// 目录查询错误
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("chat directory unavailable: {0}")]
    Unavailable(String),
}

/// 会话成员目录接口
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// 查询用户是否为指定会话的参与者
    async fn is_participant(&self, user_id: UserId, chat_id: ChatId)
        -> Result<bool, DirectoryError>;
}
