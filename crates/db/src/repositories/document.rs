use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use rosterlink_core::domain::attempt::{AttemptStage, AttemptStatus, LinkingAttempt};
use rosterlink_core::domain::client::{ClientId, OwnerId};
use rosterlink_core::domain::document::{
    DocumentId, DocumentKind, LinkableDocument, LinkingStatus,
};
use rosterlink_core::linking::LinkingTransition;

use super::codec::{format_timestamp, parse_enum, parse_optional_timestamp, parse_timestamp};
use super::{DocumentRepository, RepositoryError};
use crate::DbPool;

const DOCUMENT_COLUMNS: &str = "id,
                owner_id,
                kind,
                title,
                occurred_at,
                participant_emails_json,
                content,
                linking_status,
                client_id,
                last_link_attempt_at";

pub struct SqlDocumentRepository {
    pool: DbPool,
}

impl SqlDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_history(&self, id: &DocumentId) -> Result<Vec<LinkingAttempt>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                stage,
                status,
                attempted_at,
                confidence,
                client_id,
                reason
             FROM linking_attempt
             WHERE document_id = ?
             ORDER BY sequence ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(attempt_from_row).collect()
    }
}

#[async_trait::async_trait]
impl DocumentRepository for SqlDocumentRepository {
    async fn find_by_id(
        &self,
        id: &DocumentId,
    ) -> Result<Option<LinkableDocument>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM linkable_document WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut document = document_from_row(row)?;
        document.linking_history = self.load_history(id).await?;
        Ok(Some(document))
    }

    async fn save(&self, document: LinkableDocument) -> Result<(), RepositoryError> {
        let participants = serde_json::to_string(&document.participant_emails)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO linkable_document (
                id,
                owner_id,
                kind,
                title,
                occurred_at,
                participant_emails_json,
                content,
                linking_status,
                client_id,
                last_link_attempt_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                kind = excluded.kind,
                title = excluded.title,
                occurred_at = excluded.occurred_at,
                participant_emails_json = excluded.participant_emails_json,
                content = excluded.content",
        )
        .bind(&document.id.0)
        .bind(&document.owner_id.0)
        .bind(document.kind.as_str())
        .bind(&document.title)
        .bind(format_timestamp(document.timestamp))
        .bind(participants)
        .bind(document.content.as_deref())
        .bind(document.linking_status.as_str())
        .bind(document.client_id.as_ref().map(|id| id.0.as_str()))
        .bind(document.last_link_attempt_at.map(format_timestamp))
        .execute(&mut *tx)
        .await?;

        let stored = stored_attempts(&mut tx, &document.id).await?;
        for (offset, attempt) in document.linking_history.iter().enumerate().skip(stored as usize)
        {
            insert_attempt(&mut tx, &document.id, offset as i64 + 1, attempt).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_unlinked(
        &self,
        owner_id: &OwnerId,
        limit: u32,
    ) -> Result<Vec<LinkableDocument>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS}
             FROM linkable_document
             WHERE owner_id = ? AND client_id IS NULL
             ORDER BY occurred_at ASC, id ASC
             LIMIT ?"
        ))
        .bind(&owner_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let mut document = document_from_row(row)?;
            document.linking_history = self.load_history(&document.id).await?;
            documents.push(document);
        }
        Ok(documents)
    }

    async fn history(&self, id: &DocumentId) -> Result<Vec<LinkingAttempt>, RepositoryError> {
        self.load_history(id).await
    }

    async fn record_transition(
        &self,
        transition: &LinkingTransition,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE linkable_document
             SET linking_status = ?,
                 client_id = COALESCE(?, client_id),
                 last_link_attempt_at = ?
             WHERE id = ? AND client_id IS NULL",
        )
        .bind(transition.to.as_str())
        .bind(transition.client_id.as_ref().map(|id| id.0.as_str()))
        .bind(format_timestamp(transition.attempt.timestamp))
        .bind(&transition.document_id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "document `{}` is missing or already linked",
                transition.document_id
            )));
        }

        let sequence = stored_attempts(&mut tx, &transition.document_id).await? + 1;
        insert_attempt(&mut tx, &transition.document_id, sequence, &transition.attempt).await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn stored_attempts(
    tx: &mut Transaction<'_, Sqlite>,
    id: &DocumentId,
) -> Result<i64, RepositoryError> {
    let count = sqlx::query("SELECT COUNT(*) AS count FROM linking_attempt WHERE document_id = ?")
        .bind(&id.0)
        .fetch_one(&mut **tx)
        .await?
        .try_get::<i64, _>("count")?;
    Ok(count)
}

async fn insert_attempt(
    tx: &mut Transaction<'_, Sqlite>,
    id: &DocumentId,
    sequence: i64,
    attempt: &LinkingAttempt,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO linking_attempt (
            document_id,
            sequence,
            stage,
            status,
            attempted_at,
            confidence,
            client_id,
            reason
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id.0)
    .bind(sequence)
    .bind(attempt.stage.as_str())
    .bind(attempt.status.as_str())
    .bind(format_timestamp(attempt.timestamp))
    .bind(attempt.confidence)
    .bind(attempt.client_id.as_ref().map(|id| id.0.as_str()))
    .bind(&attempt.reason)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn document_from_row(row: SqliteRow) -> Result<LinkableDocument, RepositoryError> {
    let participants_raw = row.try_get::<String, _>("participant_emails_json")?;
    let participant_emails: Vec<String> =
        serde_json::from_str(&participants_raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid participant_emails_json ({error})"))
        })?;

    Ok(LinkableDocument {
        id: DocumentId(row.try_get("id")?),
        owner_id: OwnerId(row.try_get("owner_id")?),
        kind: parse_enum("document kind", row.try_get("kind")?, DocumentKind::parse)?,
        title: row.try_get("title")?,
        timestamp: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
        participant_emails,
        content: row.try_get("content")?,
        linking_status: parse_enum(
            "linking status",
            row.try_get("linking_status")?,
            LinkingStatus::parse,
        )?,
        client_id: row.try_get::<Option<String>, _>("client_id")?.map(ClientId),
        last_link_attempt_at: parse_optional_timestamp(
            "last_link_attempt_at",
            row.try_get("last_link_attempt_at")?,
        )?,
        linking_history: Vec::new(),
    })
}

fn attempt_from_row(row: SqliteRow) -> Result<LinkingAttempt, RepositoryError> {
    Ok(LinkingAttempt {
        stage: parse_enum("attempt stage", row.try_get("stage")?, AttemptStage::parse)?,
        status: parse_enum("attempt status", row.try_get("status")?, AttemptStatus::parse)?,
        timestamp: parse_timestamp("attempted_at", row.try_get("attempted_at")?)?,
        confidence: row.try_get("confidence")?,
        client_id: row.try_get::<Option<String>, _>("client_id")?.map(ClientId),
        reason: row.try_get("reason")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use rosterlink_core::domain::attempt::{AttemptStage, AttemptStatus};
    use rosterlink_core::domain::client::{AccountOwner, ClientId, OwnerId};
    use rosterlink_core::domain::document::{
        DocumentId, DocumentKind, LinkableDocument, LinkingStatus,
    };
    use rosterlink_core::linking::{LinkingEvent, LinkingStateMachine};
    use rosterlink_core::resolution::{MatchResult, MatchTier};

    use super::SqlDocumentRepository;
    use crate::migrations;
    use crate::repositories::{
        DocumentRepository, OwnerRepository, RepositoryError, SqlOwnerRepository,
    };
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_document_repo_round_trip_with_history() {
        let pool = setup_pool().await;
        let repo = SqlDocumentRepository::new(pool.clone());
        let document = sample_document("doc-1");

        repo.save(document.clone()).await.expect("save document");

        let found = repo.find_by_id(&document.id).await.expect("find document");
        assert_eq!(found, Some(document));
        assert_eq!(
            repo.find_by_id(&DocumentId("missing".to_string())).await.expect("find missing"),
            None
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn record_transition_appends_attempt_and_links_document() {
        let pool = setup_pool().await;
        let repo = SqlDocumentRepository::new(pool.clone());
        let document = sample_document("doc-2");
        repo.save(document.clone()).await.expect("save document");

        let machine = LinkingStateMachine::new();
        let miss = machine
            .apply(&document, &LinkingEvent::RosterEmpty, parse_ts("2026-03-01T10:00:00Z"))
            .expect("roster empty transition");
        repo.record_transition(&miss).await.expect("record needs_human");

        let stored = repo.find_by_id(&document.id).await.expect("find").expect("document");
        assert_eq!(stored.linking_status, LinkingStatus::NeedsHuman);
        assert_eq!(stored.last_link_attempt_at, Some(parse_ts("2026-03-01T10:00:00Z")));

        let link = machine
            .apply(
                &stored,
                &LinkingEvent::DeterministicMatched {
                    result: MatchResult {
                        client_id: ClientId("client-1".to_string()),
                        confidence: 0.95,
                        reason: "unique domain".to_string(),
                        tier: MatchTier::UniqueDomain,
                    },
                },
                parse_ts("2026-03-01T10:05:00Z"),
            )
            .expect("link transition");
        repo.record_transition(&link).await.expect("record auto_linked");

        let history = repo.history(&document.id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert!(history[0].is(AttemptStage::Ai, AttemptStatus::NoMatch));
        assert!(history[1].is(AttemptStage::Auto, AttemptStatus::Success));
        assert_eq!(history[1].confidence, Some(0.95));

        let linked = repo.find_by_id(&document.id).await.expect("find").expect("document");
        assert_eq!(linked.client_id, Some(ClientId("client-1".to_string())));
        assert_eq!(linked.linking_status, LinkingStatus::AutoLinked);

        let again = repo.record_transition(&link).await;
        assert!(matches!(again, Err(RepositoryError::Conflict(_))));
        assert_eq!(repo.history(&document.id).await.expect("history").len(), 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn resaving_a_linked_document_keeps_its_link() {
        let pool = setup_pool().await;
        let repo = SqlDocumentRepository::new(pool.clone());
        let document = sample_document("doc-resync");
        repo.save(document.clone()).await.expect("save document");

        let link = LinkingStateMachine::new()
            .apply(
                &document,
                &LinkingEvent::DeterministicMatched {
                    result: MatchResult {
                        client_id: ClientId("client-1".to_string()),
                        confidence: 1.0,
                        reason: "exact email".to_string(),
                        tier: MatchTier::ExactEmail,
                    },
                },
                parse_ts("2026-03-02T08:00:00Z"),
            )
            .expect("link transition");
        repo.record_transition(&link).await.expect("record auto_linked");

        let mut resynced = document.clone();
        resynced.title = "Discovery call (edited)".to_string();
        repo.save(resynced).await.expect("save re-synced copy");

        let stored = repo.find_by_id(&document.id).await.expect("find").expect("document");
        assert_eq!(stored.title, "Discovery call (edited)");
        assert_eq!(stored.client_id, Some(ClientId("client-1".to_string())));
        assert_eq!(stored.linking_status, LinkingStatus::AutoLinked);
        assert_eq!(stored.last_link_attempt_at, Some(parse_ts("2026-03-02T08:00:00Z")));
        assert_eq!(stored.linking_history.len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn list_unlinked_skips_linked_documents_and_respects_limit() {
        let pool = setup_pool().await;
        let repo = SqlDocumentRepository::new(pool.clone());

        for (n, id) in ["doc-a", "doc-b", "doc-c"].iter().enumerate() {
            let mut document = sample_document(id);
            document.timestamp = parse_ts(&format!("2026-02-0{}T09:00:00Z", n + 1));
            if *id == "doc-b" {
                document.client_id = Some(ClientId("client-1".to_string()));
                document.linking_status = LinkingStatus::AutoLinked;
            }
            repo.save(document).await.expect("save document");
        }

        let owner = OwnerId("owner-1".to_string());
        let unlinked = repo.list_unlinked(&owner, 10).await.expect("list unlinked");
        let ids: Vec<_> = unlinked.iter().map(|document| document.id.0.as_str()).collect();
        assert_eq!(ids, vec!["doc-a", "doc-c"]);

        let limited = repo.list_unlinked(&owner, 1).await.expect("list limited");
        assert_eq!(limited.len(), 1);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlOwnerRepository::new(pool.clone())
            .save(AccountOwner {
                id: OwnerId("owner-1".to_string()),
                email: "owner@agency.com".to_string(),
            })
            .await
            .expect("save owner");
        pool
    }

    fn sample_document(id: &str) -> LinkableDocument {
        LinkableDocument::new(
            id,
            OwnerId("owner-1".to_string()),
            DocumentKind::Transcript,
            "Discovery call",
            parse_ts("2026-02-23T12:00:00Z"),
        )
        .with_participants(["owner@agency.com", "jane@acme.com"])
        .with_content("We discussed the Q3 roadmap.")
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
