pub mod chat_connectors;
pub mod chat_documents;
pub mod chats;
pub mod connectors;
pub mod messages;
pub mod sessions;
pub mod token_limits;
