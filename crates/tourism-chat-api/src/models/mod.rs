pub mod chat;
pub mod session;

pub use chat::{ChatMessage, ChatRequest, SessionResponse, StatusMessage};
pub use session::{Message, Role, Session};
