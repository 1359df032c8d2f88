pub mod background;
pub mod embedding_provider;
pub mod llm;
pub mod provider_router;
pub mod retrieval;
pub mod token_estimator;

// Re-export for convenience
pub use background::{BackgroundJob, BackgroundQueue};
pub use provider_router::{ModelFactory, ProviderRouter, ResolvedProvider};
pub use retrieval::{DocumentRetriever, DocumentSearch};
pub use token_estimator::estimate_tokens;
