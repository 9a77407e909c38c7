//! 实时聊天系统核心领域模型
//!
//! 包含标识、消息实体、线上事件协议，以及外部协作方的边界契约。

pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod services;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use ids::*;
pub use message::*;
pub use services::*;
