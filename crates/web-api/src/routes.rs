use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use domain::ChatId;

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::state::AppState;
use crate::websocket;

/// 构建完整路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws/stats", get(ws_stats))
        .route("/ws/chats/{chat_id}/online", get(chat_online_users))
        .route("/ws/{chat_id}", get(websocket::handle_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct WsStats {
    online_users: usize,
    total_connections: usize,
}

/// 全局在线统计，供运维观测使用，无需认证。
async fn ws_stats(State(state): State<AppState>) -> Json<WsStats> {
    Json(WsStats {
        online_users: state.dispatcher.online_user_count().await,
        total_connections: state.dispatcher.connection_count().await,
    })
}

#[derive(Debug, Serialize)]
struct ChatOnlineResponse {
    chat_id: ChatId,
    online_users: Vec<domain::UserId>,
    count: usize,
}

/// 查询某个会话当前在线的用户，要求请求者是该会话成员。
async fn chat_online_users(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ChatOnlineResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    let user_id = state
        .auth_service
        .verify_token(token)
        .await
        .map_err(|err| ApiError::unauthorized(err.to_string()))?;

    let chat_id = ChatId::new(chat_id);
    if !state.chat_directory.is_participant(user_id, chat_id).await? {
        return Err(ApiError::forbidden("Access denied to chat"));
    }

    let online_users = state.dispatcher.online_users_in(chat_id).await;
    let count = online_users.len();
    Ok(Json(ChatOnlineResponse {
        chat_id,
        online_users,
        count,
    }))
}
