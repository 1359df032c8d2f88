//! RagChat Controller - conversation turn pipeline for multi-tenant RAG chat

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::dto::*;
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::models::internal::{Chat, Connector, Message, NewMessage, ProviderKind, Role, Session};
pub use crate::orchestrator::{TurnError, TurnOrchestrator, TurnOutcome, TurnRequest, TurnSettings};
pub use crate::storage::chroma_client::ChromaClient;
pub use crate::storage::db::init_db;
pub use crate::storage::repository::{ChatRepository, SeaOrmChatRepository};
