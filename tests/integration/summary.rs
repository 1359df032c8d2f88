use super::*;
use chrono::{Duration, Utc};
use ragchat_controller::{
    config::ProviderDefaults,
    models::internal::{NewMessage, ProviderKind, Role, Session},
    orchestrator::{
        context::build_context,
        prompts::SUMMARY_PREAMBLE,
        SummaryCache, SummaryOutcome, TurnRequest, TurnSettings, WindowPolicy,
    },
    services::llm::ModelMessage,
    storage::ChatRepository,
};

const POLICY: WindowPolicy = WindowPolicy {
    max_tokens: 4000,
    max_messages: 4,
};

/// Stores `count` alternating messages, one minute apart, oldest first.
async fn seed_history(h: &Harness, session: &Session, count: usize) {
    let start = Utc::now() - Duration::hours(1);
    for i in 0..count {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        h.repo
            .insert_message_at(
                NewMessage {
                    session_id: session.id,
                    chat_id: session.chat_id,
                    member_id: session.member_id,
                    role,
                    content: format!("message number {}", i),
                    token_count: Some(4),
                },
                start + Duration::minutes(i as i64),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_summary_is_written_once_per_window_boundary() {
    let h = Harness::new().await;
    let (_, session) = h.seed_chat(Uuid::new_v4(), Uuid::new_v4()).await;
    seed_history(&h, &session, 10).await;

    let cache = SummaryCache::new(h.repo.clone(), 4);

    let first = cache
        .maybe_summarize(session.id, POLICY, h.model.as_ref())
        .await
        .unwrap();
    let messages = h.repo.session_messages(session.id).await.unwrap();
    // Six messages fall outside a four-message window.
    assert_eq!(first, SummaryOutcome::Updated { watermark: messages[5].id });

    let second = cache
        .maybe_summarize(session.id, POLICY, h.model.as_ref())
        .await
        .unwrap();
    assert_eq!(second, SummaryOutcome::UpToDate);
    assert_eq!(h.model.summary_calls(), 1);

    let stored = h.repo.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.summary.as_deref(), Some(SCRIPTED_SUMMARY));
    assert_eq!(stored.summary_watermark, Some(messages[5].id));
}

#[tokio::test]
async fn test_summary_advances_when_window_moves() {
    let h = Harness::new().await;
    let (_, session) = h.seed_chat(Uuid::new_v4(), Uuid::new_v4()).await;
    seed_history(&h, &session, 10).await;
    let cache = SummaryCache::new(h.repo.clone(), 4);

    cache
        .maybe_summarize(session.id, POLICY, h.model.as_ref())
        .await
        .unwrap();

    h.repo
        .insert_message(NewMessage {
            session_id: session.id,
            chat_id: session.chat_id,
            member_id: session.member_id,
            role: Role::User,
            content: "one more".to_string(),
            token_count: Some(2),
        })
        .await
        .unwrap();

    let outcome = cache
        .maybe_summarize(session.id, POLICY, h.model.as_ref())
        .await
        .unwrap();
    let messages = h.repo.session_messages(session.id).await.unwrap();
    assert_eq!(outcome, SummaryOutcome::Updated { watermark: messages[6].id });
    assert_eq!(h.model.summary_calls(), 2);
}

#[tokio::test]
async fn test_failed_summary_keeps_previous_state_and_retries() {
    let h = Harness::new().await;
    let (_, session) = h.seed_chat(Uuid::new_v4(), Uuid::new_v4()).await;
    seed_history(&h, &session, 10).await;
    let cache = SummaryCache::new(h.repo.clone(), 4);

    cache
        .maybe_summarize(session.id, POLICY, h.model.as_ref())
        .await
        .unwrap();
    let before = h.repo.find_session(session.id).await.unwrap().unwrap();

    h.repo
        .insert_message(NewMessage {
            session_id: session.id,
            chat_id: session.chat_id,
            member_id: session.member_id,
            role: Role::User,
            content: "one more".to_string(),
            token_count: Some(2),
        })
        .await
        .unwrap();

    h.model.fail_summaries(true);
    let failed = cache
        .maybe_summarize(session.id, POLICY, h.model.as_ref())
        .await;
    assert!(failed.is_err());

    let after = h.repo.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(after.summary, before.summary);
    assert_eq!(after.summary_watermark, before.summary_watermark);

    h.model.fail_summaries(false);
    let retried = cache
        .maybe_summarize(session.id, POLICY, h.model.as_ref())
        .await
        .unwrap();
    let messages = h.repo.session_messages(session.id).await.unwrap();
    assert_eq!(retried, SummaryOutcome::Updated { watermark: messages[6].id });
    assert_eq!(h.model.summary_calls(), 3);
}

#[tokio::test]
async fn test_turn_succeeds_when_background_summary_fails() {
    let settings = TurnSettings {
        window: POLICY,
        summary_min_messages: 4,
        ..TurnSettings::default()
    };
    let h = Harness::with(settings, ProviderDefaults::default()).await;
    let (org, member) = (Uuid::new_v4(), Uuid::new_v4());
    let (chat, session) = h.seed_chat(org, member).await;
    h.connect(&chat, ProviderKind::OpenAi, Some("sk"), 0).await;
    seed_history(&h, &session, 8).await;

    let turn = |content: &str| TurnRequest {
        organization_id: org,
        member_id: member,
        session_id: session.id.to_string(),
        content: content.to_string(),
        locale: None,
    };

    h.model.fail_summaries(true);
    let outcome = h.orchestrator.run_turn(turn("First question")).await.unwrap();
    assert!(outcome.model_invoked);
    h.background.wait_idle().await;

    assert_eq!(h.model.summary_calls(), 1);
    let stored = h.repo.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.summary, None);
    assert_eq!(stored.summary_watermark, None);

    // The next turn retries the same work.
    h.model.fail_summaries(false);
    h.orchestrator.run_turn(turn("Second question")).await.unwrap();
    h.background.wait_idle().await;

    assert_eq!(h.model.summary_calls(), 2);
    let stored = h.repo.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.summary.as_deref(), Some(SCRIPTED_SUMMARY));
    assert!(stored.summary_watermark.is_some());
}

#[tokio::test]
async fn test_short_sessions_are_not_summarized() {
    let h = Harness::new().await;
    let (_, session) = h.seed_chat(Uuid::new_v4(), Uuid::new_v4()).await;
    seed_history(&h, &session, 3).await;

    let cache = SummaryCache::new(h.repo.clone(), 4);
    let outcome = cache
        .maybe_summarize(session.id, POLICY, h.model.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome, SummaryOutcome::TooShort);
    assert_eq!(h.model.summary_calls(), 0);
}

#[tokio::test]
async fn test_history_that_fits_needs_no_summary() {
    let h = Harness::new().await;
    let (_, session) = h.seed_chat(Uuid::new_v4(), Uuid::new_v4()).await;
    seed_history(&h, &session, 6).await;

    let cache = SummaryCache::new(h.repo.clone(), 2);
    let roomy = WindowPolicy {
        max_tokens: 4000,
        max_messages: 50,
    };
    let outcome = cache
        .maybe_summarize(session.id, roomy, h.model.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome, SummaryOutcome::NothingOutsideWindow);
}

#[tokio::test]
async fn test_unknown_session_is_reported() {
    let h = Harness::new().await;
    let cache = SummaryCache::new(h.repo.clone(), 4);

    let outcome = cache
        .maybe_summarize(Uuid::new_v4(), POLICY, h.model.as_ref())
        .await
        .unwrap();
    assert_eq!(outcome, SummaryOutcome::SessionNotFound);
}

// ============================================
// Summary in the model context
// ============================================

#[tokio::test]
async fn test_context_prepends_summary_only_when_history_was_cut() {
    let h = Harness::new().await;
    let (_, session) = h.seed_chat(Uuid::new_v4(), Uuid::new_v4()).await;
    seed_history(&h, &session, 10).await;
    h.repo
        .update_session_summary(session.id, "Earlier they discussed budgets.", Uuid::new_v4())
        .await
        .unwrap();
    let session = h.repo.find_session(session.id).await.unwrap().unwrap();

    let cut = build_context(h.repo.as_ref(), &session, POLICY).await.unwrap();
    assert!(cut.has_older);
    assert!(cut.summary_included);
    assert_eq!(cut.windowed_messages, 4);
    assert_eq!(cut.history.len(), 6);
    match &cut.history[0] {
        ModelMessage::User(text) => {
            assert!(text.starts_with(SUMMARY_PREAMBLE));
            assert!(text.contains("Earlier they discussed budgets."));
        }
        other => panic!("expected the summary turn, got {:?}", other),
    }
    assert_eq!(
        cut.history.last(),
        Some(&ModelMessage::Assistant("message number 9".to_string()))
    );

    let roomy = WindowPolicy {
        max_tokens: 4000,
        max_messages: 50,
    };
    let whole = build_context(h.repo.as_ref(), &session, roomy).await.unwrap();
    assert!(!whole.has_older);
    assert!(!whole.summary_included);
    assert_eq!(whole.history.len(), 10);
}
