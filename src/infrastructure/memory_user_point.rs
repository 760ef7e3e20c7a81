use crate::domain::now_millis;
use crate::domain::user_point_repository::{StoreError, UserPoint, UserPointRepository};
use crate::domain::UserId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;

#[derive(Default)]
pub struct UserPointTable {
    table: DashMap<UserId, UserPoint>,
    latency: Option<Duration>,
}

impl UserPointTable {
    pub fn new() -> Self {
        Self::default()
    }

    // Имитация медленного хранилища, чтобы гонки проявлялись в тестах
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            table: DashMap::new(),
            latency: Some(latency),
        }
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl UserPointRepository for UserPointTable {
    async fn select_by_id(&self, id: UserId) -> Result<UserPoint, StoreError> {
        self.delay().await;
        let record = *self
            .table
            .entry(id)
            .or_insert_with(|| UserPoint::empty(id, now_millis()));
        Ok(record)
    }

    async fn insert_or_update(&self, id: UserId, point: i64) -> Result<UserPoint, StoreError> {
        self.delay().await;
        let record = UserPoint {
            id,
            point,
            updated_at_millis: now_millis(),
        };
        self.table.insert(id, record);
        Ok(record)
    }
}
