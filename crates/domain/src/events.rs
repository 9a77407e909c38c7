//! WebSocket 线上协议事件
//!
//! 入站信封与出站事件的序列化形状即对外协议，字段名不可随意改动。

use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, Timestamp, UserId};
use crate::message::Message;

/// 客户端入站事件信封。
///
/// `kind` 保留为字符串：未知类型也要先解码成功，
/// 再以 error 事件回复发送方，而不是断开连接。
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub content: Option<String>,
}

/// 服务端推送给客户端的出站事件。
///
/// 不可变记录，产生后写给零个或多个连接，不做持久化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage {
        chat_id: ChatId,
        message: Message,
        timestamp: Timestamp,
    },
    TypingStarted {
        user_id: UserId,
        chat_id: ChatId,
        timestamp: Timestamp,
    },
    TypingStopped {
        user_id: UserId,
        chat_id: ChatId,
        timestamp: Timestamp,
    },
    UserJoined {
        user_id: UserId,
        chat_id: ChatId,
        timestamp: Timestamp,
    },
    UserLeft {
        user_id: UserId,
        chat_id: ChatId,
        timestamp: Timestamp,
    },
    Pong {
        timestamp: Timestamp,
    },
    Error {
        message: String,
        timestamp: Timestamp,
    },
}
