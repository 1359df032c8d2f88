//! Per-member token budgets over day, week and month intervals.
//!
//! The check is advisory: it reads current usage and does not reserve
//! anything, so concurrent turns from one member can overshoot slightly.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::internal::{TokenInterval, TokenLimit};
use crate::storage::repository::{ChatRepository, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaItem {
    pub interval: TokenInterval,
    pub limit_tokens: i64,
    pub used_tokens: i64,
    pub remaining_tokens: i64,
    pub would_exceed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub blocked: bool,
    pub items: Vec<QuotaItem>,
}

/// Midnight UTC at the start of the interval containing `now`. Weeks start
/// on Monday.
pub fn interval_start(interval: TokenInterval, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let first_day: NaiveDate = match interval {
        TokenInterval::Day => today,
        TokenInterval::Week => today - Duration::days(i64::from(today.weekday().num_days_from_monday())),
        TokenInterval::Month => today.with_day(1).unwrap_or(today),
    };
    first_day.and_time(NaiveTime::MIN).and_utc()
}

/// Evaluates one limit given the usage already recorded in its interval.
pub fn evaluate(limit: &TokenLimit, used_tokens: i64, tokens_to_consume: i64) -> QuotaItem {
    let used = used_tokens.max(0);
    let remaining = (limit.limit_tokens - used).max(0);
    QuotaItem {
        interval: limit.interval,
        limit_tokens: limit.limit_tokens,
        used_tokens: used,
        remaining_tokens: remaining,
        would_exceed: remaining < tokens_to_consume,
    }
}

pub struct QuotaLedger {
    repo: Arc<dyn ChatRepository>,
}

impl QuotaLedger {
    pub fn new(repo: Arc<dyn ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn check_and_status(
        &self,
        member_id: Uuid,
        organization_id: Uuid,
        tokens_to_consume: i64,
    ) -> Result<QuotaStatus, RepositoryError> {
        self.check_and_status_at(member_id, organization_id, tokens_to_consume, Utc::now())
            .await
    }

    pub async fn check_and_status_at(
        &self,
        member_id: Uuid,
        organization_id: Uuid,
        tokens_to_consume: i64,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, RepositoryError> {
        let limits = self.repo.token_limits(organization_id, member_id).await?;
        if limits.is_empty() {
            return Ok(QuotaStatus::default());
        }

        let items = try_join_all(limits.iter().map(|limit| async move {
            let since = interval_start(limit.interval, now);
            let used = self.repo.sum_member_tokens_since(member_id, since).await?;
            Ok::<_, RepositoryError>(evaluate(limit, used, tokens_to_consume))
        }))
        .await?;

        let blocked = items.iter().any(|item| item.would_exceed);
        if blocked {
            tracing::info!(member_id = %member_id, tokens = tokens_to_consume, "Token quota would be exceeded");
        }

        Ok(QuotaStatus { blocked, items })
    }
}
