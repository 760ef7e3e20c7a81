use crate::domain::now_millis;
use crate::domain::user_point_repository::{StoreError, UserPoint, UserPointRepository};
use crate::domain::UserId;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

pub struct SqliteUserPointRepo {
    pub pool: SqlitePool,
}

impl SqliteUserPointRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserPointRepository for SqliteUserPointRepo {
    async fn select_by_id(&self, id: UserId) -> Result<UserPoint, StoreError> {
        let row = sqlx::query("SELECT point, updated_at FROM user_point WHERE user_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(record) => Ok(UserPoint {
                id,
                point: record.get::<i64, _>(0),
                updated_at_millis: record.get::<i64, _>(1),
            }),
            None => {
                // Первое обращение: заводим пустую запись
                let empty = UserPoint::empty(id, now_millis());
                sqlx::query(
                    "INSERT OR IGNORE INTO user_point (user_id, point, updated_at) VALUES (?, 0, ?)",
                )
                .bind(id)
                .bind(empty.updated_at_millis)
                .execute(&self.pool)
                .await?;
                Ok(empty)
            }
        }
    }

    async fn insert_or_update(&self, id: UserId, point: i64) -> Result<UserPoint, StoreError> {
        let updated_at_millis = now_millis();
        sqlx::query(
            "INSERT INTO user_point (user_id, point, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET point = excluded.point, updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(point)
        .bind(updated_at_millis)
        .execute(&self.pool)
        .await?;

        Ok(UserPoint {
            id,
            point,
            updated_at_millis,
        })
    }
}
