//! 外部协作方边界契约
//!
//! 实时核心只在边界上依赖这三个服务：令牌认证、会话成员目录、消息存储。
//! 具体实现（JWT、数据库等）由外层适配器提供。

pub mod auth_service;
pub mod chat_directory;
pub mod message_store;

// 重新导出服务
pub use auth_service::*;
pub use chat_directory::*;
pub use message_store::*;
