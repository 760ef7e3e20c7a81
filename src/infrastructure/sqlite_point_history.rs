use crate::domain::point_history_repository::{
    PointHistory, PointHistoryRepository, TransactionType,
};
use crate::domain::user_point_repository::StoreError;
use crate::domain::UserId;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

pub struct SqlitePointHistoryRepo {
    pub pool: SqlitePool,
}

impl SqlitePointHistoryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PointHistoryRepository for SqlitePointHistoryRepo {
    async fn insert(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionType,
        occurred_at_millis: i64,
    ) -> Result<PointHistory, StoreError> {
        let result = sqlx::query(
            "INSERT INTO point_history (user_id, amount, kind, occurred_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(kind.as_str())
        .bind(occurred_at_millis)
        .execute(&self.pool)
        .await?;

        Ok(PointHistory {
            id: result.last_insert_rowid(),
            user_id,
            amount,
            kind,
            occurred_at_millis,
        })
    }

    async fn select_all_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PointHistory>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, amount, kind, occurred_at FROM point_history WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<PointHistory, StoreError> {
                let raw_kind: String = row.get(2);
                let kind = TransactionType::parse(&raw_kind).ok_or_else(|| {
                    StoreError::Corrupt(format!("unknown history kind: {}", raw_kind))
                })?;
                Ok(PointHistory {
                    id: row.get(0),
                    user_id,
                    amount: row.get(1),
                    kind,
                    occurred_at_millis: row.get(3),
                })
            })
            .collect()
    }
}
