use axum::extract::FromRef;
use std::sync::Arc;

use crate::services::conversation::ConversationManager;
use crate::storage::SessionStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub conversation_manager: Arc<ConversationManager>,
    pub session_store: SessionStore,
}

impl AppState {
    pub fn new(conversation_manager: Arc<ConversationManager>) -> Self {
        let session_store = conversation_manager.store().clone();
        Self {
            conversation_manager,
            session_store,
        }
    }
}

impl FromRef<AppState> for Arc<ConversationManager> {
    fn from_ref(state: &AppState) -> Self {
        state.conversation_manager.clone()
    }
}

impl FromRef<AppState> for SessionStore {
    fn from_ref(state: &AppState) -> Self {
        state.session_store.clone()
    }
}
