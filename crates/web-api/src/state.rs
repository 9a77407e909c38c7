use std::sync::Arc;

use application::ChatDispatcher;
use domain::{AuthService, ChatDirectory};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ChatDispatcher>,
    pub auth_service: Arc<dyn AuthService>,
    pub chat_directory: Arc<dyn ChatDirectory>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<ChatDispatcher>,
        auth_service: Arc<dyn AuthService>,
        chat_directory: Arc<dyn ChatDirectory>,
    ) -> Self {
        Self {
            dispatcher,
            auth_service,
            chat_directory,
        }
    }
}
