//! 应用层实现。
//!
//! 实时连接核心：在线注册表、输入指示追踪、事件调度。
//! 这里持有全部共享可变状态，外层 WebSocket 端点只做传输和编解码。

pub mod clock;
pub mod dispatcher;
pub mod memory;
pub mod registry;
pub mod typing;

pub use clock::{Clock, SystemClock};
pub use dispatcher::{ChatDispatcher, EventSender};
pub use memory::{InMemoryChatDirectory, InMemoryMessageStore};
pub use registry::{PresenceRegistry, RemovedConnection};
pub use typing::TypingTracker;
