//! WebSocket 连接端点
//!
//! 握手 → 认证 → 准入 → 注册调度器 → 双任务（发送/接收）循环 → 断开清理。
//! 出站事件经由每连接的无界队列，发送任务是传输写端的唯一消费者。

use axum::{
    extract::{
        ws::{CloseFrame, Message as WsMessage, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use domain::{ChatId, ClientEvent, ConnectionId, ServerEvent, UserId};

use crate::state::AppState;

/// 认证失败的应用级关闭码。
const CLOSE_AUTH_FAILED: u16 = 4001;
/// 无会话访问权的应用级关闭码。
const CLOSE_ACCESS_DENIED: u16 = 4003;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// `GET /ws/{chat_id}?token=...` 升级入口。
///
/// 认证在升级之后做：失败要用应用级关闭码告知客户端，
/// 而关闭码只存在于已建立的 WebSocket 上。
pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let chat_id = ChatId::new(chat_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, chat_id, query.token))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, chat_id: ChatId, token: String) {
    let user_id = match state.auth_service.verify_token(&token).await {
        Ok(user_id) => user_id,
        Err(err) => {
            warn!(%chat_id, error = %err, "WebSocket authentication failed");
            close_with(socket, CLOSE_AUTH_FAILED, "Authentication failed").await;
            return;
        }
    };

    match state.chat_directory.is_participant(user_id, chat_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(%user_id, %chat_id, "WebSocket access denied: not a participant");
            close_with(socket, CLOSE_ACCESS_DENIED, "Access denied to chat").await;
            return;
        }
        Err(err) => {
            // 目录不可用时拒绝准入，宁可让客户端重连也不放行
            error!(%user_id, %chat_id, error = %err, "chat directory lookup failed");
            close_with(socket, CLOSE_ACCESS_DENIED, "Access denied to chat").await;
            return;
        }
    }

    let connection_id = ConnectionId::generate();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    state
        .dispatcher
        .connect(connection_id, user_id, chat_id, event_tx)
        .await;
    info!(%connection_id, %user_id, %chat_id, "WebSocket connection established");

    // 发送任务：队列关闭或传输写失败即退出
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    error!(error = %err, "failed to serialize outbound event");
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // 接收循环：逐帧解码并交给调度器
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_receiver.next().await {
            match message {
                WsMessage::Text(text) => {
                    handle_client_text(&recv_state, connection_id, user_id, chat_id, text.as_str())
                        .await;
                }
                WsMessage::Close(_) => {
                    debug!(%connection_id, "client closed WebSocket");
                    break;
                }
                // 传输层 Ping/Pong 由底层协议栈自动应答
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => {}
            }
        }
    });

    // 任一任务结束即终止另一个，随后统一走断开清理
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.dispatcher.disconnect(connection_id).await;
    info!(%connection_id, %user_id, %chat_id, "WebSocket connection closed");
}

/// 单帧入站处理。解码或语义错误只回 error 事件，连接保持打开。
async fn handle_client_text(
    state: &AppState,
    connection_id: ConnectionId,
    user_id: UserId,
    chat_id: ChatId,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            debug!(%connection_id, error = %err, "invalid inbound JSON");
            state
                .dispatcher
                .reply_error(connection_id, "Invalid JSON format")
                .await;
            return;
        }
    };

    // 信封里的 chat_id 仅作诊断，连接绑定的会话才是权威
    if let Some(envelope_chat) = event.chat_id {
        if envelope_chat != chat_id {
            debug!(%connection_id, %envelope_chat, %chat_id, "envelope chat_id ignored");
        }
    }

    match event.kind.as_str() {
        "message" => {
            let content = event.content.unwrap_or_default();
            state
                .dispatcher
                .send_message(connection_id, user_id, chat_id, &content)
                .await;
        }
        "typing" => {
            let started = event.content.as_deref() == Some("start");
            state.dispatcher.typing_signal(user_id, chat_id, started).await;
        }
        "ping" => {
            state.dispatcher.ping(connection_id).await;
        }
        other => {
            state
                .dispatcher
                .reply_error(connection_id, format!("Unknown message type: {}", other))
                .await;
        }
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(err) = socket.send(WsMessage::Close(Some(frame))).await {
        debug!(error = %err, "failed to send close frame");
    }
}
