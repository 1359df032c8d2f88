pub mod chroma_client;
pub mod db;
pub mod entities;
pub mod migrations;
pub mod repository;

pub use chroma_client::{ChromaClient, ChromaError};
pub use db::init_db;
pub use entities::{messages, sessions};
pub use repository::{ChatRepository, RepositoryError, SeaOrmChatRepository};
