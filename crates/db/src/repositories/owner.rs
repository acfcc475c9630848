use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use rosterlink_core::domain::client::{AccountOwner, OwnerId};

use super::codec::format_timestamp;
use super::{OwnerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOwnerRepository {
    pool: DbPool,
}

impl SqlOwnerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OwnerRepository for SqlOwnerRepository {
    async fn find_by_id(&self, id: &OwnerId) -> Result<Option<AccountOwner>, RepositoryError> {
        let row = sqlx::query("SELECT id, email FROM account_owner WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(owner_from_row).transpose()
    }

    async fn save(&self, owner: AccountOwner) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO account_owner (id, email, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET email = excluded.email",
        )
        .bind(&owner.id.0)
        .bind(&owner.email)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn owner_from_row(row: SqliteRow) -> Result<AccountOwner, RepositoryError> {
    Ok(AccountOwner { id: OwnerId(row.try_get("id")?), email: row.try_get("email")? })
}
