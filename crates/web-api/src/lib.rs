//! Web API 层。
//!
//! 提供 Axum 路由，将 WebSocket 连接和外围只读查询委托给应用层调度器。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;

pub use auth::JwtService;
pub use config::JwtConfig;
pub use routes::router;
pub use state::AppState;
