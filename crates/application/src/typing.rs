//! 输入指示追踪器
//!
//! 按 (会话, 用户) 记录最近一次 "开始输入" 的时间戳。
//! 键存在即 "正在输入"，键不存在即 "未输入"。条目在显式 stop、
//! 断开连接时移除；`sweep_stale` 是丢失 stop 帧时的兜底，
//! 防止指示器永久残留。

use std::collections::HashMap;

use chrono::Duration;
use domain::{ChatId, Timestamp, UserId};
use tokio::sync::RwLock;

/// 输入指示追踪器
#[derive(Debug, Default)]
pub struct TypingTracker {
    inner: RwLock<HashMap<ChatId, HashMap<UserId, Timestamp>>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录或刷新输入时间戳
    pub async fn set_typing(&self, chat_id: ChatId, user_id: UserId, now: Timestamp) {
        let mut inner = self.inner.write().await;
        inner.entry(chat_id).or_default().insert(user_id, now);
    }

    /// 移除条目，不存在时为 no-op。返回条目是否存在过。
    pub async fn clear_typing(&self, chat_id: ChatId, user_id: UserId) -> bool {
        let mut inner = self.inner.write().await;
        let Some(users) = inner.get_mut(&chat_id) else {
            return false;
        };
        let removed = users.remove(&user_id).is_some();
        if users.is_empty() {
            inner.remove(&chat_id);
        }
        removed
    }

    /// 断开连接时清除该用户在所有会话的输入条目，
    /// 返回受影响的会话，供调度器逐个广播 typing_stopped。
    pub async fn clear_user(&self, user_id: UserId) -> Vec<ChatId> {
        let mut inner = self.inner.write().await;
        let mut affected = Vec::new();
        inner.retain(|chat_id, users| {
            if users.remove(&user_id).is_some() {
                affected.push(*chat_id);
            }
            !users.is_empty()
        });
        affected
    }

    /// 过期扫描：移除早于 `now - max_age` 的条目并返回它们。
    pub async fn sweep_stale(&self, max_age: Duration, now: Timestamp) -> Vec<(ChatId, UserId)> {
        let cutoff = now - max_age;
        let mut inner = self.inner.write().await;
        let mut expired = Vec::new();
        inner.retain(|chat_id, users| {
            users.retain(|user_id, started_at| {
                if *started_at < cutoff {
                    expired.push((*chat_id, *user_id));
                    false
                } else {
                    true
                }
            });
            !users.is_empty()
        });
        expired
    }

    /// 用户当前是否在该会话标记为输入中
    pub async fn is_typing(&self, chat_id: ChatId, user_id: UserId) -> bool {
        let inner = self.inner.read().await;
        inner
            .get(&chat_id)
            .is_some_and(|users| users.contains_key(&user_id))
    }
}
