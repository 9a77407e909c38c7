//! 边界服务的内存实现
//!
//! 供独立运行的二进制和集成测试使用。持久化格式、查询能力
//! 都不在本服务范围内，这里只提供可运行的最小适配器。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    ChatDirectory, ChatId, DirectoryError, Message, MessageId, MessageStore, NewMessage,
    StoreError, UserId,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clock::Clock;

/// 内存消息存储
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<Message>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryMessageStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// 已存储的消息数量
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let record = Message {
            id: MessageId::new(Uuid::new_v4()),
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content,
            created_at: self.clock.now(),
        };
        let mut messages = self.messages.write().await;
        messages.push(record.clone());
        Ok(record)
    }
}

/// 内存会话成员目录。
///
/// 显式授权成员关系；`allow_all` 构造器用于本地开发，
/// 任何用户都可以进入任何会话。
#[derive(Default)]
pub struct InMemoryChatDirectory {
    members: RwLock<HashMap<ChatId, HashSet<UserId>>>,
    allow_all: bool,
}

impl InMemoryChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_all() -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            allow_all: true,
        }
    }

    /// 授权用户进入会话
    pub async fn grant(&self, user_id: UserId, chat_id: ChatId) {
        let mut members = self.members.write().await;
        members.entry(chat_id).or_default().insert(user_id);
    }
}

#[async_trait]
impl ChatDirectory for InMemoryChatDirectory {
    async fn is_participant(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> Result<bool, DirectoryError> {
        if self.allow_all {
            return Ok(true);
        }
        let members = self.members.read().await;
        Ok(members
            .get(&chat_id)
            .is_some_and(|users| users.contains(&user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use domain::MessageContent;

    #[tokio::test]
    async fn store_assigns_id_and_timestamp() {
        let store = InMemoryMessageStore::new(Arc::new(SystemClock));
        let chat = ChatId(Uuid::new_v4());
        let sender = UserId(Uuid::new_v4());

        let message = store
            .append(NewMessage {
                chat_id: chat,
                sender_id: sender,
                content: MessageContent::new("hello").unwrap(),
            })
            .await
            .unwrap();

        assert_eq!(message.chat_id, chat);
        assert_eq!(message.sender_id, sender);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn directory_checks_explicit_grants() {
        let directory = InMemoryChatDirectory::new();
        let chat = ChatId(Uuid::new_v4());
        let user = UserId(Uuid::new_v4());

        assert!(!directory.is_participant(user, chat).await.unwrap());
        directory.grant(user, chat).await;
        assert!(directory.is_participant(user, chat).await.unwrap());
    }

    #[tokio::test]
    async fn allow_all_admits_everyone() {
        let directory = InMemoryChatDirectory::allow_all();
        let chat = ChatId(Uuid::new_v4());
        let user = UserId(Uuid::new_v4());
        assert!(directory.is_participant(user, chat).await.unwrap());
    }
}
