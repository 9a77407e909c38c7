//! 事件调度器
//!
//! 实时核心的门面：连接生命周期（join/leave）、消息发送、输入信号、
//! 广播扇出，以及死连接的自愈清理。组合注册表与输入追踪器，
//! 驱动所有出站推送。
//!
//! 出站写通过每连接一个的无界 mpsc 队列完成，队列的消费端由该连接的
//! 发送任务独占，保证并发广播下对单个传输的写是串行的。
//! 发送失败即视为连接已死，在扇出结束后统一触发该连接的断开清理，
//! 一个坏连接不会阻塞或中断对其余连接的投递。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use domain::{
    ChatId, ConnectionId, Message, MessageContent, MessageStore, NewMessage, ServerEvent, UserId,
};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::registry::PresenceRegistry;
use crate::typing::TypingTracker;

/// 连接出站事件发送端
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// 事件调度器。
///
/// 显式构造的实例，由接入层通过 `Arc` 共享，生命周期与服务一致，
/// 不使用全局单例。
pub struct ChatDispatcher {
    registry: PresenceRegistry,
    typing: TypingTracker,
    /// 连接 -> 出站队列发送端
    senders: RwLock<HashMap<ConnectionId, EventSender>>,
    message_store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
}

impl ChatDispatcher {
    pub fn new(message_store: Arc<dyn MessageStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: PresenceRegistry::new(),
            typing: TypingTracker::new(),
            senders: RwLock::new(HashMap::new()),
            message_store,
            clock,
        }
    }

    /// 连接建立：登记出站队列、注册到注册表，
    /// 并向会话内其他成员广播 user_joined（不回显给本人）。
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        chat_id: ChatId,
        sender: EventSender,
    ) {
        {
            let mut senders = self.senders.write().await;
            senders.insert(connection_id, sender);
        }
        self.registry.register(connection_id, user_id, chat_id).await;
        info!(%connection_id, %user_id, %chat_id, "connection joined chat");

        let event = ServerEvent::UserJoined {
            user_id,
            chat_id,
            timestamp: self.clock.now(),
        };
        let dead = self.fan_out(chat_id, &event, Some(user_id)).await;
        self.reap(dead).await;
    }

    /// 连接断开清理。
    ///
    /// 幂等：接收循环发现传输关闭、广播发现写失败都会走到这里，
    /// 注册表保证第二个调用方是 no-op。
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.reap(vec![connection_id]).await;
    }

    /// 发送消息：校验、持久化、全量广播（包含发送方，
    /// 让同一用户的所有设备收敛到权威记录）。
    /// 存储失败只回发送方 error 事件，不广播也不断开。
    pub async fn send_message(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        chat_id: ChatId,
        content: &str,
    ) {
        let content = match MessageContent::new(content) {
            Ok(content) => content,
            Err(err) => {
                self.reply_error(connection_id, err.to_string()).await;
                return;
            }
        };

        let request = NewMessage {
            chat_id,
            sender_id: user_id,
            content,
        };
        match self.message_store.append(request).await {
            Ok(message) => {
                let event = ServerEvent::NewMessage {
                    chat_id,
                    message,
                    timestamp: self.clock.now(),
                };
                let dead = self.fan_out(chat_id, &event, None).await;
                self.reap(dead).await;
            }
            Err(err) => {
                warn!(%user_id, %chat_id, error = %err, "message store rejected message");
                self.reply_error(connection_id, err.to_string()).await;
            }
        }
    }

    /// 输入信号：start 记录并广播 typing_started，stop 清除并广播
    /// typing_stopped，都不回显给发信用户。两个方向都幂等。
    pub async fn typing_signal(&self, user_id: UserId, chat_id: ChatId, started: bool) {
        let now = self.clock.now();
        let event = if started {
            self.typing.set_typing(chat_id, user_id, now).await;
            ServerEvent::TypingStarted {
                user_id,
                chat_id,
                timestamp: now,
            }
        } else {
            self.typing.clear_typing(chat_id, user_id).await;
            ServerEvent::TypingStopped {
                user_id,
                chat_id,
                timestamp: now,
            }
        };
        let dead = self.fan_out(chat_id, &event, Some(user_id)).await;
        self.reap(dead).await;
    }

    /// 心跳：只回发起连接 pong，无广播无状态变更。
    pub async fn ping(&self, connection_id: ConnectionId) {
        let event = ServerEvent::Pong {
            timestamp: self.clock.now(),
        };
        if !self.send_to(connection_id, event).await {
            self.reap(vec![connection_id]).await;
        }
    }

    /// 向发起连接回一条 error 事件；连接保持打开。
    pub async fn reply_error(&self, connection_id: ConnectionId, message: impl Into<String>) {
        let event = ServerEvent::Error {
            message: message.into(),
            timestamp: self.clock.now(),
        };
        if !self.send_to(connection_id, event).await {
            self.reap(vec![connection_id]).await;
        }
    }

    /// 过期输入条目兜底扫描：清除超龄条目并广播 typing_stopped。
    /// 返回清除的条目数。
    pub async fn sweep_stale_typing(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let expired = self.typing.sweep_stale(max_age, now).await;
        let count = expired.len();

        let mut dead = Vec::new();
        for (chat_id, user_id) in expired {
            debug!(%user_id, %chat_id, "expiring stale typing indicator");
            let event = ServerEvent::TypingStopped {
                user_id,
                chat_id,
                timestamp: now,
            };
            dead.extend(self.fan_out(chat_id, &event, Some(user_id)).await);
        }
        self.reap(dead).await;
        count
    }

    // ---- 查询面（供外围 HTTP 端点使用的纯读） ----

    pub async fn online_user_count(&self) -> usize {
        self.registry.online_user_count().await
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }

    pub async fn online_users_in(&self, chat_id: ChatId) -> Vec<UserId> {
        self.registry.online_users_in(chat_id).await
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.registry.is_online(user_id).await
    }

    // ---- 内部 ----

    /// 向会话内连接扇出事件，返回写失败的连接。
    ///
    /// 成员集合和发送端句柄先在锁内拷出快照再投递，
    /// 投递本身不持任何锁。
    async fn fan_out(
        &self,
        chat_id: ChatId,
        event: &ServerEvent,
        exclude_user: Option<UserId>,
    ) -> Vec<ConnectionId> {
        let targets = self.registry.connections_for(chat_id, exclude_user).await;
        if targets.is_empty() {
            return Vec::new();
        }

        let handles: Vec<(ConnectionId, EventSender)> = {
            let senders = self.senders.read().await;
            targets
                .iter()
                .filter_map(|id| senders.get(id).map(|tx| (*id, tx.clone())))
                .collect()
        };

        let mut dead = Vec::new();
        for (connection_id, tx) in handles {
            if tx.send(event.clone()).is_err() {
                warn!(%connection_id, %chat_id, "delivery failed, scheduling disconnect");
                dead.push(connection_id);
            }
        }
        dead
    }

    async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let tx = {
            let senders = self.senders.read().await;
            senders.get(&connection_id).cloned()
        };
        match tx {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// 死连接清理工作队列。
    ///
    /// 清理自身会广播 user_left / typing_stopped，广播又可能发现
    /// 新的死连接，所以用迭代工作表而不是递归。
    async fn reap(&self, mut dead: Vec<ConnectionId>) {
        while let Some(connection_id) = dead.pop() {
            dead.extend(self.cleanup_connection(connection_id).await);
        }
    }

    /// 单个连接的断开清理，返回清理期间新发现的死连接。
    async fn cleanup_connection(&self, connection_id: ConnectionId) -> Vec<ConnectionId> {
        {
            let mut senders = self.senders.write().await;
            senders.remove(&connection_id);
        }

        let Some(removed) = self.registry.unregister(connection_id).await else {
            // 已被并发的另一条路径清理过
            return Vec::new();
        };
        let user_id = removed.user_id;
        info!(%connection_id, %user_id, "connection disconnected");

        let mut dead = Vec::new();

        // 先清输入条目并通知，user_left 必须是该用户的最后一条事件
        for chat_id in self.typing.clear_user(user_id).await {
            let event = ServerEvent::TypingStopped {
                user_id,
                chat_id,
                timestamp: self.clock.now(),
            };
            dead.extend(self.fan_out(chat_id, &event, Some(user_id)).await);
        }

        // 该用户在会话内已无其他连接时才广播 user_left
        for chat_id in removed.left_chats {
            let event = ServerEvent::UserLeft {
                user_id,
                chat_id,
                timestamp: self.clock.now(),
            };
            dead.extend(self.fan_out(chat_id, &event, Some(user_id)).await);
        }

        dead
    }
}
