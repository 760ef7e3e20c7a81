use super::UserId;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPoint {
    pub id: UserId,
    pub point: i64,
    pub updated_at_millis: i64,
}

impl UserPoint {
    pub fn empty(id: UserId, updated_at_millis: i64) -> Self {
        Self {
            id,
            point: 0,
            updated_at_millis,
        }
    }
}

// Хранилище текущего баланса. Чтение и запись по одному ключу атомарны,
// межключевых транзакций нет.
#[async_trait]
pub trait UserPointRepository: Send + Sync {
    // Возвращает баланс; если записи нет, создаёт её с нулём.
    async fn select_by_id(&self, id: UserId) -> Result<UserPoint, StoreError>;

    async fn insert_or_update(&self, id: UserId, point: i64) -> Result<UserPoint, StoreError>;
}
