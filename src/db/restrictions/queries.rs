//! Restriction store operations.

use super::models::{
    ActiveRestriction, ExpirationEntry, ExpiredRestriction, ReasonEntry, Restriction,
    RestrictionKind,
};
use crate::db::DbError;
use sqlx::SqlitePool;
use tracing::debug;

type RestrictionRow = (
    i64,
    String,
    i64,
    String,
    String,
    i64,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<i64>,
);

/// Repository for restriction operations.
pub struct RestrictionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RestrictionRepository<'a> {
    /// Create a new restriction repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a new active restriction and return its id.
    ///
    /// Any still-active record for the same (channel, kind, mask) is closed in
    /// the same transaction, with an unknown remover.
    pub async fn add(
        &self,
        channel: &str,
        kind: RestrictionKind,
        mask: &str,
        set_by: &str,
        set_at: i64,
    ) -> Result<i64, DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE restrictions
            SET removed_by = NULL, removed_at = ?
            WHERE channel = ? AND kind = ? AND mask = ? AND removed_at IS NULL
            "#,
        )
        .bind(set_at)
        .bind(channel)
        .bind(kind.as_i64())
        .bind(mask)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO restrictions (channel, kind, mask, set_by, set_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(channel)
        .bind(kind.as_i64())
        .bind(mask)
        .bind(set_by)
        .bind(set_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let id = result.last_insert_rowid();
        debug!(id, channel = %channel, kind = %kind, mask = %mask, "Restriction added");
        Ok(id)
    }

    /// Id of the active record for (channel, kind, mask), if any.
    pub async fn find_active_id(
        &self,
        channel: &str,
        kind: RestrictionKind,
        mask: &str,
    ) -> Result<Option<i64>, DbError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM restrictions
            WHERE channel = ? AND kind = ? AND mask = ? AND removed_at IS NULL
            "#,
        )
        .bind(channel)
        .bind(kind.as_i64())
        .bind(mask)
        .fetch_optional(self.pool)
        .await?;

        Ok(id)
    }

    /// Stamp removal onto a record. Returns `false` if it was already removed
    /// (or never existed).
    pub async fn mark_removed(
        &self,
        id: i64,
        removed_by: Option<&str>,
        removed_at: i64,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE restrictions
            SET removed_by = ?, removed_at = ?
            WHERE id = ? AND removed_at IS NULL
            "#,
        )
        .bind(removed_by)
        .bind(removed_at)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stamp removal onto the active record for (channel, kind, mask), if any.
    pub async fn mark_removed_target(
        &self,
        channel: &str,
        kind: RestrictionKind,
        mask: &str,
        removed_by: Option<&str>,
        removed_at: i64,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE restrictions
            SET removed_by = ?, removed_at = ?
            WHERE channel = ? AND kind = ? AND mask = ? AND removed_at IS NULL
            "#,
        )
        .bind(removed_by)
        .bind(removed_at)
        .bind(channel)
        .bind(kind.as_i64())
        .bind(mask)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The channel's currently active restrictions, oldest first.
    pub async fn active_restrictions(
        &self,
        channel: &str,
    ) -> Result<Vec<ActiveRestriction>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64, String)>(
            r#"
            SELECT id, kind, mask FROM restrictions
            WHERE channel = ? AND removed_at IS NULL
            ORDER BY id
            "#,
        )
        .bind(channel)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, kind, mask)| {
                Ok(ActiveRestriction {
                    id,
                    kind: RestrictionKind::from_i64(kind)?,
                    mask,
                })
            })
            .collect()
    }

    /// Full record with latest reason and expiry.
    pub async fn get(&self, id: i64) -> Result<Restriction, DbError> {
        let row = sqlx::query_as::<_, RestrictionRow>(
            r#"
            SELECT r.id, r.channel, r.kind, r.mask, r.set_by, r.set_at,
                   r.removed_by, r.removed_at,
                   (SELECT reason FROM restriction_reasons
                    WHERE restriction_id = r.id ORDER BY id DESC LIMIT 1),
                   (SELECT expires_at FROM restriction_expirations
                    WHERE restriction_id = r.id ORDER BY id DESC LIMIT 1)
            FROM restrictions r
            WHERE r.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::RestrictionNotFound(id))?;

        let (id, channel, kind, mask, set_by, set_at, removed_by, removed_at, reason, expires_at) =
            row;
        Ok(Restriction {
            id,
            channel,
            kind: RestrictionKind::from_i64(kind)?,
            mask,
            set_by,
            set_at,
            removed_by,
            removed_at,
            reason,
            expires_at,
        })
    }

    /// Most recently added restriction still active in the channel.
    pub async fn last_active_id(&self, channel: &str) -> Result<Option<i64>, DbError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM restrictions
            WHERE channel = ? AND removed_at IS NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(channel)
        .fetch_optional(self.pool)
        .await?;

        Ok(id)
    }

    async fn set_at_of(&self, id: i64) -> Result<i64, DbError> {
        sqlx::query_scalar::<_, i64>("SELECT set_at FROM restrictions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(DbError::RestrictionNotFound(id))
    }

    /// Append to the reason history.
    pub async fn append_reason(
        &self,
        id: i64,
        set_by: &str,
        set_at: i64,
        reason: &str,
    ) -> Result<(), DbError> {
        self.set_at_of(id).await?;

        sqlx::query(
            r#"
            INSERT INTO restriction_reasons (restriction_id, set_by, set_at, reason)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(set_by)
        .bind(set_at)
        .bind(reason)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Append to the expiration history. The stored expiry is the record's
    /// own `set_at` plus `duration` seconds; returns that absolute time.
    pub async fn append_expiration(
        &self,
        id: i64,
        set_by: &str,
        set_at: i64,
        duration: i64,
    ) -> Result<i64, DbError> {
        let expires_at = self.set_at_of(id).await?.saturating_add(duration);

        sqlx::query(
            r#"
            INSERT INTO restriction_expirations (restriction_id, set_by, set_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(set_by)
        .bind(set_at)
        .bind(expires_at)
        .execute(self.pool)
        .await?;

        Ok(expires_at)
    }

    /// Active restrictions whose latest expiry is earlier than `timestamp`.
    pub async fn expired_before(&self, timestamp: i64) -> Result<Vec<ExpiredRestriction>, DbError> {
        let rows = sqlx::query_as::<_, (String, i64, String, i64)>(
            r#"
            SELECT r.channel, r.kind, r.mask, r.id
            FROM restrictions r
            JOIN restriction_expirations e ON e.id = (
                SELECT id FROM restriction_expirations
                WHERE restriction_id = r.id
                ORDER BY id DESC
                LIMIT 1
            )
            WHERE r.removed_at IS NULL AND e.expires_at < ?
            ORDER BY r.id
            "#,
        )
        .bind(timestamp)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(channel, kind, mask, id)| {
                Ok(ExpiredRestriction {
                    channel,
                    kind: RestrictionKind::from_i64(kind)?,
                    mask,
                    id,
                })
            })
            .collect()
    }

    /// Full reason history, oldest first.
    pub async fn reasons(&self, id: i64) -> Result<Vec<ReasonEntry>, DbError> {
        let rows = sqlx::query_as::<_, (String, i64, String)>(
            r#"
            SELECT set_by, set_at, reason FROM restriction_reasons
            WHERE restriction_id = ?
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(set_by, set_at, reason)| ReasonEntry {
                set_by,
                set_at,
                reason,
            })
            .collect())
    }

    /// Full expiration history, oldest first.
    pub async fn expirations(&self, id: i64) -> Result<Vec<ExpirationEntry>, DbError> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT set_by, set_at, expires_at FROM restriction_expirations
            WHERE restriction_id = ?
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(set_by, set_at, expires_at)| ExpirationEntry {
                set_by,
                set_at,
                expires_at,
            })
            .collect())
    }
}
