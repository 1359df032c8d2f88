use super::*;
use chrono::{DateTime, TimeZone, Utc};
use ragchat_controller::{
    models::internal::{NewMessage, Role, Session, TokenInterval},
    orchestrator::QuotaLedger,
};

/// Friday 2026-03-20, noon UTC.
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap()
}

async fn spend(h: &Harness, session: &Session, member_id: Uuid, tokens: i32, at: DateTime<Utc>) {
    h.repo
        .insert_message_at(
            NewMessage {
                session_id: session.id,
                chat_id: session.chat_id,
                member_id,
                role: Role::User,
                content: "usage".to_string(),
                token_count: Some(tokens),
            },
            at,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_intervals_are_evaluated_independently() {
    let h = Harness::new().await;
    let (org, member) = (Uuid::new_v4(), Uuid::new_v4());
    let (_, session) = h.seed_chat(org, member).await;

    // Earlier this month, earlier this week (Monday), and today.
    spend(&h, &session, member, 200, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()).await;
    spend(&h, &session, member, 100, Utc.with_ymd_and_hms(2026, 3, 16, 9, 0, 0).unwrap()).await;
    spend(&h, &session, member, 50, Utc.with_ymd_and_hms(2026, 3, 20, 8, 0, 0).unwrap()).await;

    h.repo.create_token_limit(org, member, TokenInterval::Day, 100).await.unwrap();
    h.repo.create_token_limit(org, member, TokenInterval::Week, 1000).await.unwrap();
    h.repo.create_token_limit(org, member, TokenInterval::Month, 380).await.unwrap();

    let ledger = QuotaLedger::new(h.repo.clone());
    let status = ledger
        .check_and_status_at(member, org, 40, now())
        .await
        .unwrap();

    let item = |interval| {
        status
            .items
            .iter()
            .find(|i| i.interval == interval)
            .cloned()
            .unwrap()
    };

    let day = item(TokenInterval::Day);
    assert_eq!(day.used_tokens, 50);
    assert_eq!(day.remaining_tokens, 50);
    assert!(!day.would_exceed);

    let week = item(TokenInterval::Week);
    assert_eq!(week.used_tokens, 150);
    assert!(!week.would_exceed);

    let month = item(TokenInterval::Month);
    assert_eq!(month.used_tokens, 350);
    assert_eq!(month.remaining_tokens, 30);
    assert!(month.would_exceed);

    assert!(status.blocked);
}

#[tokio::test]
async fn test_usage_of_other_members_is_ignored() {
    let h = Harness::new().await;
    let (org, member, colleague) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (_, session) = h.seed_chat(org, member).await;

    spend(&h, &session, colleague, 900, now()).await;
    spend(&h, &session, member, 10, now()).await;
    h.repo.create_token_limit(org, member, TokenInterval::Day, 100).await.unwrap();

    let status = QuotaLedger::new(h.repo.clone())
        .check_and_status_at(member, org, 0, now())
        .await
        .unwrap();

    assert!(!status.blocked);
    assert_eq!(status.items[0].used_tokens, 10);
}

#[tokio::test]
async fn test_no_limits_means_unrestricted() {
    let h = Harness::new().await;
    let (org, member) = (Uuid::new_v4(), Uuid::new_v4());

    let status = QuotaLedger::new(h.repo.clone())
        .check_and_status_at(member, org, i64::MAX, now())
        .await
        .unwrap();

    assert!(!status.blocked);
    assert!(status.items.is_empty());
}

#[tokio::test]
async fn test_limits_of_other_organizations_do_not_apply() {
    let h = Harness::new().await;
    let (org, other_org, member) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    h.repo
        .create_token_limit(other_org, member, TokenInterval::Day, 1)
        .await
        .unwrap();

    let status = QuotaLedger::new(h.repo.clone())
        .check_and_status_at(member, org, 500, now())
        .await
        .unwrap();
    assert!(!status.blocked);
}
