use sqlx::{sqlite::SqliteRow, Row};

use rosterlink_core::domain::client::{ClientId, ClientRecord, OwnerId};

use super::codec::{format_timestamp, parse_timestamp};
use super::{ClientRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn list_for_owner(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<ClientRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                owner_id,
                business_email,
                business_name,
                contact_name,
                status,
                created_at
             FROM client
             WHERE owner_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&owner_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(client_from_row).collect()
    }

    async fn save(&self, client: ClientRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO client (
                id,
                owner_id,
                business_email,
                business_name,
                contact_name,
                status,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                business_email = excluded.business_email,
                business_name = excluded.business_name,
                contact_name = excluded.contact_name,
                status = excluded.status",
        )
        .bind(&client.id.0)
        .bind(&client.owner_id.0)
        .bind(client.business_email.as_deref())
        .bind(client.business_name.as_deref())
        .bind(client.contact_name.as_deref())
        .bind(client.status.as_deref())
        .bind(format_timestamp(client.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn client_from_row(row: SqliteRow) -> Result<ClientRecord, RepositoryError> {
    Ok(ClientRecord {
        id: ClientId(row.try_get("id")?),
        owner_id: OwnerId(row.try_get("owner_id")?),
        business_email: row.try_get("business_email")?,
        business_name: row.try_get("business_name")?,
        contact_name: row.try_get("contact_name")?,
        status: row.try_get("status")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
