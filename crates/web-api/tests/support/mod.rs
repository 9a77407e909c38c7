use std::sync::Arc;

use axum::Router;
use domain::{ChatId, UserId};

use application::{ChatDispatcher, Clock, InMemoryChatDirectory, InMemoryMessageStore, SystemClock};
use web_api::{router as build_router_fn, AppState, JwtConfig, JwtService};

pub const TEST_SECRET: &str = "test-secret-key-with-at-least-32-characters";

/// 测试用应用装配：内存适配器 + 真实 JWT 服务
pub struct TestHarness {
    pub router: Router,
    pub jwt: JwtService,
    pub directory: Arc<InMemoryChatDirectory>,
}

impl TestHarness {
    /// 为用户签发有效 token
    pub fn token_for(&self, user_id: UserId) -> String {
        self.jwt.generate_token(user_id).expect("generate token")
    }

    /// 授权用户进入会话并签发 token
    pub async fn grant_and_token(&self, user_id: UserId, chat_id: ChatId) -> String {
        self.directory.grant(user_id, chat_id).await;
        self.token_for(user_id)
    }
}

pub fn build_harness() -> TestHarness {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let message_store = Arc::new(InMemoryMessageStore::new(clock.clone()));
    let directory = Arc::new(InMemoryChatDirectory::new());
    let dispatcher = Arc::new(ChatDispatcher::new(message_store, clock));

    let jwt = JwtService::new(JwtConfig {
        secret: TEST_SECRET.to_string(),
        expiration_hours: 24,
    });

    let state = AppState::new(dispatcher, Arc::new(jwt.clone()), directory.clone());

    TestHarness {
        router: build_router_fn(state),
        jwt,
        directory,
    }
}
