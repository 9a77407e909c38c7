//! 在线连接注册表
//!
//! 维护活跃连接与 (用户, 会话) 成员关系的双向索引。纯内存数据结构，
//! 不做任何 I/O，也不负责通知——通知是调度器的职责。
//!
//! 三个索引始终保持一致：一个连接恰好出现在一条反向映射里，
//! 并且最多出现在它加入过的每个会话的正向集合中一次。
//! 全部索引由同一把锁保护，避免跨索引的中间状态被观察到。

use std::collections::{HashMap, HashSet};

use domain::{ChatId, ConnectionId, UserId};
use tokio::sync::RwLock;

/// 单个连接的注册信息
#[derive(Debug, Clone)]
struct ConnectionEntry {
    user_id: UserId,
    chats: HashSet<ChatId>,
}

#[derive(Debug, Default)]
struct RegistryIndexes {
    /// 连接表：稳定容器，索引只保存 id 不保存句柄
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// 用户 -> 连接
    user_connections: HashMap<UserId, HashSet<ConnectionId>>,
    /// 会话 -> 连接
    chat_connections: HashMap<ChatId, HashSet<ConnectionId>>,
}

/// `unregister` 的结果：断开的连接归属，以及受影响的会话。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedConnection {
    pub user_id: UserId,
    /// 该连接注册过的全部会话
    pub chats: Vec<ChatId>,
    /// 其中用户已无任何其他连接的会话（需要广播 user_left）
    pub left_chats: Vec<ChatId>,
}

/// 在线连接注册表
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: RwLock<RegistryIndexes>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接。对同一 (连接, 会话) 重复调用是幂等的。
    ///
    /// 观察到的协议里一个连接在接入时绑定一个会话，但注册表
    /// 支持同一物理连接服务多个会话。
    pub async fn register(&self, connection_id: ConnectionId, user_id: UserId, chat_id: ChatId) {
        let mut inner = self.inner.write().await;

        let entry = inner
            .connections
            .entry(connection_id)
            .or_insert_with(|| ConnectionEntry {
                user_id,
                chats: HashSet::new(),
            });
        entry.chats.insert(chat_id);

        inner
            .user_connections
            .entry(user_id)
            .or_default()
            .insert(connection_id);
        inner
            .chat_connections
            .entry(chat_id)
            .or_default()
            .insert(connection_id);
    }

    /// 注销连接，从所有索引中移除并清理空桶。
    ///
    /// 幂等：断开可能同时由接收循环和广播写失败触发，
    /// 第二次调用返回 `None`，未知连接也是 no-op。
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<RemovedConnection> {
        let mut inner = self.inner.write().await;

        let entry = inner.connections.remove(&connection_id)?;
        let user_id = entry.user_id;

        if let Some(user_conns) = inner.user_connections.get_mut(&user_id) {
            user_conns.remove(&connection_id);
            if user_conns.is_empty() {
                inner.user_connections.remove(&user_id);
            }
        }

        let mut chats = Vec::with_capacity(entry.chats.len());
        let mut left_chats = Vec::new();
        for chat_id in entry.chats {
            if let Some(chat_conns) = inner.chat_connections.get_mut(&chat_id) {
                chat_conns.remove(&connection_id);
                if chat_conns.is_empty() {
                    inner.chat_connections.remove(&chat_id);
                }
            }

            // 用户在该会话是否还有其他连接
            let still_present = inner
                .chat_connections
                .get(&chat_id)
                .map(|conns| {
                    conns.iter().any(|id| {
                        inner
                            .connections
                            .get(id)
                            .is_some_and(|c| c.user_id == user_id)
                    })
                })
                .unwrap_or(false);
            if !still_present {
                left_chats.push(chat_id);
            }
            chats.push(chat_id);
        }

        Some(RemovedConnection {
            user_id,
            chats,
            left_chats,
        })
    }

    /// 会话内当前注册的连接快照，可按用户排除（用于不回显通知）。
    pub async fn connections_for(
        &self,
        chat_id: ChatId,
        exclude_user: Option<UserId>,
    ) -> Vec<ConnectionId> {
        let inner = self.inner.read().await;
        let Some(conns) = inner.chat_connections.get(&chat_id) else {
            return Vec::new();
        };
        conns
            .iter()
            .filter(|id| match exclude_user {
                Some(user_id) => inner
                    .connections
                    .get(id)
                    .is_some_and(|c| c.user_id != user_id),
                None => true,
            })
            .copied()
            .collect()
    }

    /// 用户是否在线（至少存在一个连接）
    pub async fn is_online(&self, user_id: UserId) -> bool {
        let inner = self.inner.read().await;
        inner.user_connections.contains_key(&user_id)
    }

    /// 会话内当前在线的用户
    pub async fn online_users_in(&self, chat_id: ChatId) -> Vec<UserId> {
        let inner = self.inner.read().await;
        let Some(conns) = inner.chat_connections.get(&chat_id) else {
            return Vec::new();
        };
        let users: HashSet<UserId> = conns
            .iter()
            .filter_map(|id| inner.connections.get(id).map(|c| c.user_id))
            .collect();
        users.into_iter().collect()
    }

    /// 在线用户总数
    pub async fn online_user_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.user_connections.len()
    }

    /// 活跃连接总数
    pub async fn connection_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.connections.len()
    }

    /// 校验三个索引的互相一致性，仅测试使用。
    #[cfg(test)]
    pub(crate) async fn assert_consistent(&self) {
        let inner = self.inner.read().await;

        for (conn_id, entry) in &inner.connections {
            assert!(
                inner.user_connections[&entry.user_id].contains(conn_id),
                "connection missing from its user bucket"
            );
            for chat_id in &entry.chats {
                assert!(
                    inner.chat_connections[chat_id].contains(conn_id),
                    "connection missing from its chat bucket"
                );
            }
        }
        for (user_id, conns) in &inner.user_connections {
            assert!(!conns.is_empty(), "empty user bucket not cleaned up");
            for conn_id in conns {
                assert_eq!(inner.connections[conn_id].user_id, *user_id);
            }
        }
        for (chat_id, conns) in &inner.chat_connections {
            assert!(!conns.is_empty(), "empty chat bucket not cleaned up");
            for conn_id in conns {
                assert!(inner.connections[conn_id].chats.contains(chat_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ids() -> (ConnectionId, UserId, ChatId) {
        (
            ConnectionId::generate(),
            UserId(Uuid::new_v4()),
            ChatId(Uuid::new_v4()),
        )
    }

    #[tokio::test]
    async fn register_and_query() {
        let registry = PresenceRegistry::new();
        let (conn, user, chat) = ids();

        registry.register(conn, user, chat).await;
        registry.assert_consistent().await;

        assert!(registry.is_online(user).await);
        assert_eq!(registry.online_users_in(chat).await, vec![user]);
        assert_eq!(registry.connections_for(chat, None).await, vec![conn]);
        assert_eq!(registry.online_user_count().await, 1);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn register_is_idempotent_per_connection_chat_pair() {
        let registry = PresenceRegistry::new();
        let (conn, user, chat) = ids();

        registry.register(conn, user, chat).await;
        registry.register(conn, user, chat).await;
        registry.assert_consistent().await;

        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(registry.connections_for(chat, None).await.len(), 1);
    }

    #[tokio::test]
    async fn unregister_removes_from_every_index() {
        let registry = PresenceRegistry::new();
        let (conn, user, chat) = ids();

        registry.register(conn, user, chat).await;
        let removed = registry.unregister(conn).await.expect("first unregister");
        registry.assert_consistent().await;

        assert_eq!(removed.user_id, user);
        assert_eq!(removed.chats, vec![chat]);
        assert_eq!(removed.left_chats, vec![chat]);
        assert!(!registry.is_online(user).await);
        assert!(registry.online_users_in(chat).await.is_empty());
        assert_eq!(registry.online_user_count().await, 0);
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_tolerates_unknown() {
        let registry = PresenceRegistry::new();
        let (conn, user, chat) = ids();

        registry.register(conn, user, chat).await;
        assert!(registry.unregister(conn).await.is_some());
        assert!(registry.unregister(conn).await.is_none());
        assert!(registry.unregister(ConnectionId::generate()).await.is_none());
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn user_with_two_connections_stays_online_until_last_drop() {
        let registry = PresenceRegistry::new();
        let user = UserId(Uuid::new_v4());
        let chat = ChatId(Uuid::new_v4());
        let first = ConnectionId::generate();
        let second = ConnectionId::generate();

        registry.register(first, user, chat).await;
        registry.register(second, user, chat).await;

        let removed = registry.unregister(first).await.expect("removed");
        assert!(removed.left_chats.is_empty(), "user still has a connection");
        assert!(registry.is_online(user).await);

        let removed = registry.unregister(second).await.expect("removed");
        assert_eq!(removed.left_chats, vec![chat]);
        assert!(!registry.is_online(user).await);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn connections_for_excludes_requested_user() {
        let registry = PresenceRegistry::new();
        let chat = ChatId(Uuid::new_v4());
        let alice = UserId(Uuid::new_v4());
        let bob = UserId(Uuid::new_v4());
        let alice_conn = ConnectionId::generate();
        let bob_conn = ConnectionId::generate();

        registry.register(alice_conn, alice, chat).await;
        registry.register(bob_conn, bob, chat).await;

        let others = registry.connections_for(chat, Some(alice)).await;
        assert_eq!(others, vec![bob_conn]);

        let mut all = registry.connections_for(chat, None).await;
        all.sort_by_key(|id| id.0);
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn indices_stay_consistent_under_interleaved_calls() {
        let registry = PresenceRegistry::new();
        let chat_a = ChatId(Uuid::new_v4());
        let chat_b = ChatId(Uuid::new_v4());
        let user = UserId(Uuid::new_v4());
        let conn = ConnectionId::generate();

        // 同一物理连接先后注册到两个会话
        registry.register(conn, user, chat_a).await;
        registry.register(conn, user, chat_b).await;
        registry.assert_consistent().await;

        let removed = registry.unregister(conn).await.expect("removed");
        assert_eq!(removed.chats.len(), 2);
        assert_eq!(removed.left_chats.len(), 2);
        registry.assert_consistent().await;
        assert_eq!(registry.connection_count().await, 0);
    }
}
