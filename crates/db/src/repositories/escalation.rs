use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use rosterlink_core::domain::document::DocumentId;
use rosterlink_core::domain::escalation::{ClaimState, EscalationClaim};

use super::codec::{format_timestamp, parse_enum, parse_timestamp, parse_u32};
use super::{EscalationClaimRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEscalationClaimRepository {
    pool: DbPool,
}

impl SqlEscalationClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EscalationClaimRepository for SqlEscalationClaimRepository {
    async fn try_reserve(
        &self,
        document_id: &DocumentId,
        payload_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let at = format_timestamp(at);
        let result = sqlx::query(
            "INSERT INTO escalation_claim (
                document_id,
                state,
                payload_hash,
                attempt_count,
                reserved_at,
                updated_at,
                last_error
             ) VALUES (?, 'reserved', ?, 1, ?, ?, NULL)
             ON CONFLICT(document_id) DO UPDATE SET
                state = 'reserved',
                payload_hash = excluded.payload_hash,
                attempt_count = escalation_claim.attempt_count + 1,
                reserved_at = excluded.reserved_at,
                updated_at = excluded.updated_at,
                last_error = NULL
             WHERE escalation_claim.state = 'failed'",
        )
        .bind(&document_id.0)
        .bind(payload_hash)
        .bind(&at)
        .bind(&at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(
        &self,
        document_id: &DocumentId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE escalation_claim
             SET state = 'completed', updated_at = ?, last_error = NULL
             WHERE document_id = ? AND state = 'reserved'",
        )
        .bind(format_timestamp(at))
        .bind(&document_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release(
        &self,
        document_id: &DocumentId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE escalation_claim
             SET state = 'failed', updated_at = ?, last_error = ?
             WHERE document_id = ? AND state = 'reserved'",
        )
        .bind(format_timestamp(at))
        .bind(error)
        .bind(&document_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<EscalationClaim>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                document_id,
                state,
                payload_hash,
                attempt_count,
                reserved_at,
                updated_at,
                last_error
             FROM escalation_claim
             WHERE document_id = ?",
        )
        .bind(&document_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(claim_from_row).transpose()
    }
}

fn claim_from_row(row: SqliteRow) -> Result<EscalationClaim, RepositoryError> {
    Ok(EscalationClaim {
        document_id: DocumentId(row.try_get("document_id")?),
        state: parse_enum("claim state", row.try_get("state")?, ClaimState::parse)?,
        payload_hash: row.try_get("payload_hash")?,
        attempt_count: parse_u32("attempt_count", row.try_get("attempt_count")?)?,
        reserved_at: parse_timestamp("reserved_at", row.try_get("reserved_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        last_error: row.try_get("last_error")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use rosterlink_core::domain::client::{AccountOwner, OwnerId};
    use rosterlink_core::domain::document::{DocumentId, DocumentKind, LinkableDocument};
    use rosterlink_core::domain::escalation::ClaimState;

    use super::SqlEscalationClaimRepository;
    use crate::migrations;
    use crate::repositories::{
        DocumentRepository, EscalationClaimRepository, OwnerRepository, SqlDocumentRepository,
        SqlOwnerRepository,
    };
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn reserve_is_exclusive_until_released() {
        let pool = setup_pool().await;
        let repo = SqlEscalationClaimRepository::new(pool.clone());
        let id = DocumentId("doc-1".to_string());

        let first = repo.try_reserve(&id, "hash-1", parse_ts("2026-03-01T10:00:00Z")).await;
        assert!(first.expect("reserve"));
        let second = repo.try_reserve(&id, "hash-1", parse_ts("2026-03-01T10:00:01Z")).await;
        assert!(!second.expect("second reserve"));

        repo.release(&id, "telegram timeout", parse_ts("2026-03-01T10:00:05Z"))
            .await
            .expect("release");
        let failed = repo.find(&id).await.expect("find").expect("claim");
        assert_eq!(failed.state, ClaimState::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("telegram timeout"));

        let retry = repo.try_reserve(&id, "hash-2", parse_ts("2026-03-01T10:01:00Z")).await;
        assert!(retry.expect("re-reserve"));
        repo.complete(&id, parse_ts("2026-03-01T10:01:02Z")).await.expect("complete");

        let completed = repo.find(&id).await.expect("find").expect("claim");
        assert_eq!(completed.state, ClaimState::Completed);
        assert_eq!(completed.attempt_count, 2);
        assert_eq!(completed.payload_hash, "hash-2");
        assert_eq!(completed.last_error, None);

        let after = repo.try_reserve(&id, "hash-3", parse_ts("2026-03-01T10:02:00Z")).await;
        assert!(!after.expect("after completion"));

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let owner = OwnerId("owner-1".to_string());
        SqlOwnerRepository::new(pool.clone())
            .save(AccountOwner { id: owner.clone(), email: "owner@agency.com".to_string() })
            .await
            .expect("save owner");
        SqlDocumentRepository::new(pool.clone())
            .save(LinkableDocument::new(
                "doc-1",
                owner,
                DocumentKind::FormResponse,
                "Intake form",
                parse_ts("2026-02-28T09:00:00Z"),
            ))
            .await
            .expect("save document");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
