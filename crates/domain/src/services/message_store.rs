//! 消息存储接口
//!
//! 持久化一条已校验的消息并返回权威记录。调用可能较慢，
//! 调度器不得在持有注册表锁时调用它。

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{Message, NewMessage};

/// 消息存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 领域规则拒绝（对发送方回 error 事件，不广播）
    #[error("message rejected: {0}")]
    Rejected(String),
    /// 存储本身失败
    #[error("message store failure: {0}")]
    Storage(String),
}

/// 消息存储接口
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化消息并返回带 id 和时间戳的权威记录
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError>;
}
