pub mod context;
pub mod prompts;
pub mod quota;
pub mod summary_cache;
pub mod title;
pub mod tools;
pub mod windowing;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::internal::{Chat, Message, NewMessage, ProviderKind, Role, Session};
use crate::services::background::{BackgroundJob, BackgroundQueue};
use crate::services::llm::{LanguageModel, LlmError, ModelMessage, ModelRequest, ModelResponse};
use crate::services::provider_router::{ModelFactory, ProviderRouter};
use crate::services::retrieval::DocumentSearch;
use crate::services::token_estimator::{estimate_tokens, estimate_tokens_i32};
use crate::storage::repository::{ChatRepository, RepositoryError};

pub use quota::{QuotaItem, QuotaLedger, QuotaStatus};
pub use summary_cache::{SummaryCache, SummaryOutcome};
pub use windowing::WindowPolicy;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Session not found")]
    SessionNotFound,
    #[error("Chat not found")]
    ChatNotFound,
    #[error("Missing credential for provider {provider}: {detail}")]
    MissingCredential {
        provider: ProviderKind,
        detail: String,
    },
    #[error("Token limit exceeded")]
    TokenLimitExceeded { status: QuotaStatus },
    #[error("Model call failed after user message {user_message_id} was stored: {source}")]
    ModelFailed {
        user_message_id: Uuid,
        source: LlmError,
    },
    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy)]
pub struct TurnSettings {
    pub window: WindowPolicy,
    pub max_output_tokens: u32,
    pub max_steps: usize,
    pub retrieval_limit: usize,
    pub summary_min_messages: usize,
    pub title_max_chars: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            window: WindowPolicy::default(),
            max_output_tokens: 4096,
            max_steps: 3,
            retrieval_limit: 5,
            summary_min_messages: 10,
            title_max_chars: 80,
        }
    }
}

impl From<&Config> for TurnSettings {
    fn from(config: &Config) -> Self {
        Self {
            window: WindowPolicy {
                max_tokens: config.context_max_tokens,
                max_messages: config.context_max_messages,
            },
            max_output_tokens: config.max_output_tokens,
            max_steps: config.max_steps,
            retrieval_limit: config.retrieval_limit,
            summary_min_messages: config.summary_min_messages,
            title_max_chars: config.title_max_chars,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub organization_id: Uuid,
    pub member_id: Uuid,
    pub session_id: String,
    pub content: String,
    pub locale: Option<String>,
}

/// A turn that passed every pre-model check and has its user message stored.
pub struct PreparedTurn {
    pub session: Session,
    pub chat: Chat,
    pub user_message: Message,
    pub locale: Option<String>,
    system_prompt: String,
    history: Vec<ModelMessage>,
    document_ids: Vec<Uuid>,
    model: Option<Arc<dyn LanguageModel>>,
}

impl PreparedTurn {
    pub fn model_configured(&self) -> bool {
        self.model.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: Uuid,
    pub user_message_id: Uuid,
    pub assistant_message: Message,
    pub model_invoked: bool,
}

pub struct TurnOrchestrator {
    repo: Arc<dyn ChatRepository>,
    router: Arc<ProviderRouter>,
    models: Arc<dyn ModelFactory>,
    search: Arc<dyn DocumentSearch>,
    background: BackgroundQueue,
    quota: QuotaLedger,
    summaries: Arc<SummaryCache>,
    settings: TurnSettings,
}

impl TurnOrchestrator {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        router: Arc<ProviderRouter>,
        models: Arc<dyn ModelFactory>,
        search: Arc<dyn DocumentSearch>,
        background: BackgroundQueue,
        settings: TurnSettings,
    ) -> Self {
        Self {
            quota: QuotaLedger::new(repo.clone()),
            summaries: Arc::new(SummaryCache::new(repo.clone(), settings.summary_min_messages)),
            repo,
            router,
            models,
            search,
            background,
            settings,
        }
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Runs a whole turn without streaming.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome, TurnError> {
        let prepared = self.prepare(request).await?;
        self.complete_turn(prepared, None).await
    }

    /// Validation, tenant checks, provider resolution, quota and context.
    /// Nothing is written unless every check passes; the last step stores
    /// the user message.
    pub async fn prepare(&self, request: TurnRequest) -> Result<PreparedTurn, TurnError> {
        let content = request.content.trim();
        if request.session_id.trim().is_empty() {
            return Err(TurnError::InvalidPayload("sessionId is required".to_string()));
        }
        if content.is_empty() {
            return Err(TurnError::InvalidPayload("content is required".to_string()));
        }

        // An id that cannot exist is reported like any other unknown session.
        let session_id =
            Uuid::parse_str(request.session_id.trim()).map_err(|_| TurnError::SessionNotFound)?;
        let session = self
            .repo
            .find_session(session_id)
            .await?
            .ok_or(TurnError::SessionNotFound)?;
        let chat = self
            .repo
            .find_chat(session.chat_id)
            .await?
            .filter(|chat| chat.organization_id == request.organization_id)
            .ok_or(TurnError::ChatNotFound)?;

        let (document_ids, connectors) = tokio::try_join!(
            self.repo.chat_document_ids(chat.id),
            self.repo.chat_connectors(chat.id)
        )?;

        let model = match self.router.select_connector(&connectors) {
            Some(connector) => {
                let resolved = self.router.resolve(connector).map_err(|e| {
                    warn!(chat_id = %chat.id, provider = %e.provider(), "{}", e);
                    TurnError::MissingCredential {
                        provider: e.provider(),
                        detail: e.to_string(),
                    }
                })?;
                Some(self.models.build(&resolved))
            }
            None => None,
        };

        let system_prompt =
            prompts::system_prompt(!document_ids.is_empty(), request.locale.as_deref());
        let prompt_tokens = prompt_tokens(&system_prompt, content);
        let tokens_to_consume =
            i64::try_from(prompt_tokens).unwrap_or(i64::MAX) + i64::from(self.settings.max_output_tokens);

        let status = self
            .quota
            .check_and_status(request.member_id, request.organization_id, tokens_to_consume)
            .await?;
        if status.blocked {
            return Err(TurnError::TokenLimitExceeded { status });
        }

        // Read before the new message is stored so it is not sent twice.
        let context = context::build_context(self.repo.as_ref(), &session, self.settings.window).await?;
        let mut history = context.history;
        history.push(ModelMessage::User(content.to_string()));

        let user_message = self
            .repo
            .insert_message(NewMessage {
                session_id: session.id,
                chat_id: chat.id,
                member_id: request.member_id,
                role: Role::User,
                content: content.to_string(),
                token_count: Some(estimate_tokens_i32(content)),
            })
            .await?;

        debug!(
            session_id = %session.id,
            documents = document_ids.len(),
            model = ?model.as_ref().map(|m| m.name()),
            "Prepared turn"
        );

        Ok(PreparedTurn {
            session,
            chat,
            user_message,
            locale: request.locale,
            system_prompt,
            history,
            document_ids,
            model,
        })
    }

    /// Produces and stores the assistant reply, then schedules title and
    /// summary maintenance. Text fragments go to `deltas` as they arrive.
    pub async fn complete_turn(
        &self,
        prepared: PreparedTurn,
        deltas: Option<mpsc::Sender<String>>,
    ) -> Result<TurnOutcome, TurnError> {
        let Some(model) = prepared.model.clone() else {
            let reply = prompts::fallback_reply(prepared.locale.as_deref());
            if let Some(tx) = &deltas {
                let _ = tx.send(reply.to_string()).await;
            }
            let assistant_message = self.store_assistant(&prepared, reply).await?;
            info!(session_id = %prepared.session.id, "No model configured, stored fallback reply");
            return Ok(TurnOutcome {
                session_id: prepared.session.id,
                user_message_id: prepared.user_message.id,
                assistant_message,
                model_invoked: false,
            });
        };

        let answer = self
            .run_model(&prepared, model.as_ref(), deltas.as_ref())
            .await
            .map_err(|source| {
                warn!(
                    session_id = %prepared.session.id,
                    model = %model.name(),
                    "Model call failed: {}", source
                );
                TurnError::ModelFailed {
                    user_message_id: prepared.user_message.id,
                    source,
                }
            })?;

        let assistant_message = self.store_assistant(&prepared, &answer).await?;
        self.schedule_background(&prepared, &assistant_message, model);

        Ok(TurnOutcome {
            session_id: prepared.session.id,
            user_message_id: prepared.user_message.id,
            assistant_message,
            model_invoked: true,
        })
    }

    /// Tool-calling loop. The last permitted step is sent without tools so
    /// the model has to answer in text.
    async fn run_model(
        &self,
        prepared: &PreparedTurn,
        model: &dyn LanguageModel,
        deltas: Option<&mpsc::Sender<String>>,
    ) -> Result<String, LlmError> {
        let tools = if prepared.document_ids.is_empty() {
            Vec::new()
        } else {
            vec![tools::search_tool()]
        };
        let max_steps = self.settings.max_steps.max(1);

        let mut messages = prepared.history.clone();
        let mut parts: Vec<String> = Vec::new();

        for step in 0..max_steps {
            let last_step = step + 1 == max_steps;
            let request = ModelRequest {
                system: prepared.system_prompt.clone(),
                messages: messages.clone(),
                tools: if last_step { Vec::new() } else { tools.clone() },
                max_tokens: self.settings.max_output_tokens,
            };

            let response = call_model(model, &request, deltas, !parts.is_empty()).await?;
            debug!(
                step,
                model = %model.name(),
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "Model step finished"
            );
            let text = response.text.trim();
            if !text.is_empty() {
                parts.push(text.to_string());
            }

            if response.tool_calls.is_empty() || last_step {
                break;
            }

            debug!(step, calls = response.tool_calls.len(), "Model requested tools");
            messages.push(ModelMessage::ToolCalls {
                text: (!text.is_empty()).then(|| text.to_string()),
                calls: response.tool_calls.clone(),
            });
            for call in &response.tool_calls {
                let output = tools::execute(
                    call,
                    self.search.as_ref(),
                    self.settings.retrieval_limit,
                    &prepared.document_ids,
                )
                .await;
                messages.push(ModelMessage::ToolResult {
                    call_id: call.id.clone(),
                    content: output,
                });
            }
        }

        if parts.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(parts.join("\n\n"))
    }

    async fn store_assistant(
        &self,
        prepared: &PreparedTurn,
        content: &str,
    ) -> Result<Message, RepositoryError> {
        self.repo
            .insert_message(NewMessage {
                session_id: prepared.session.id,
                chat_id: prepared.chat.id,
                member_id: prepared.user_message.member_id,
                role: Role::Assistant,
                content: content.to_string(),
                token_count: Some(estimate_tokens_i32(content)),
            })
            .await
    }

    fn schedule_background(
        &self,
        prepared: &PreparedTurn,
        assistant: &Message,
        model: Arc<dyn LanguageModel>,
    ) {
        let session_id = prepared.session.id;

        if title::needs_title(prepared.session.title.as_deref(), &prepared.chat.name) {
            let repo = self.repo.clone();
            let model = model.clone();
            let user_text = prepared.user_message.content.clone();
            let assistant_text = assistant.content.clone();
            let max_chars = self.settings.title_max_chars;
            let _ = self.background.submit(BackgroundJob::new("session_title", async move {
                if let Some(title) =
                    title::generate_title(model.as_ref(), &user_text, &assistant_text, max_chars)
                        .await?
                {
                    repo.update_session_title(session_id, &title).await?;
                    debug!(session_id = %session_id, title = %title, "Stored session title");
                }
                Ok(())
            }));
        }

        let summaries = self.summaries.clone();
        let policy = self.settings.window;
        let _ = self.background.submit(BackgroundJob::new("session_summary", async move {
            let outcome = summaries
                .maybe_summarize(session_id, policy, model.as_ref())
                .await?;
            debug!(session_id = %session_id, outcome = ?outcome, "Summary maintenance finished");
            Ok(())
        }));
    }
}

/// Tokens charged for the prompt side of a turn, estimated over the text
/// actually sent rather than per part.
fn prompt_tokens(system_prompt: &str, content: &str) -> usize {
    let mut prompt = String::with_capacity(system_prompt.len() + content.len());
    prompt.push_str(system_prompt);
    prompt.push_str(content);
    estimate_tokens(&prompt)
}

/// Reshapes one step's streamed fragments so that, joined, they equal the
/// trimmed step text, preceded by a paragraph break when `separate` is set
/// and the step produced any text at all.
#[derive(Debug, Default)]
struct StepStream {
    separate: bool,
    started: bool,
    held: String,
}

impl StepStream {
    fn new(separate: bool) -> Self {
        Self {
            separate,
            ..Default::default()
        }
    }

    fn push(&mut self, fragment: &str) -> Option<String> {
        let fragment = if self.started {
            fragment
        } else {
            fragment.trim_start()
        };
        let body = fragment.trim_end();
        if body.is_empty() {
            // Trailing whitespace is only sent once more text follows it.
            if self.started {
                self.held.push_str(fragment);
            }
            return None;
        }

        let mut out = String::new();
        if !self.started {
            self.started = true;
            if self.separate {
                out.push_str("\n\n");
            }
        }
        out.push_str(&std::mem::take(&mut self.held));
        out.push_str(body);
        self.held.push_str(&fragment[body.len()..]);
        Some(out)
    }
}

/// One model call, streaming when a delta sink is present.
async fn call_model(
    model: &dyn LanguageModel,
    request: &ModelRequest,
    deltas: Option<&mpsc::Sender<String>>,
    separate: bool,
) -> Result<ModelResponse, LlmError> {
    let Some(out) = deltas else {
        return model.complete(request).await;
    };

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let forward = async move {
        let mut shaper = StepStream::new(separate);
        while let Some(fragment) = rx.recv().await {
            if let Some(text) = shaper.push(&fragment) {
                let _ = out.send(text).await;
            }
        }
    };

    let (result, ()) = tokio::join!(model.complete_streaming(request, tx), forward);
    result
}
