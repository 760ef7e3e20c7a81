use crate::domain::point_history_repository::{
    PointHistory, PointHistoryRepository, TransactionType,
};
use crate::domain::user_point_repository::StoreError;
use crate::domain::UserId;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct PointHistoryTable {
    entries: RwLock<Vec<PointHistory>>,
}

impl PointHistoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PointHistoryRepository for PointHistoryTable {
    async fn insert(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionType,
        occurred_at_millis: i64,
    ) -> Result<PointHistory, StoreError> {
        let mut entries = self.entries.write().await;
        // id присваивается под тем же замком, что и push: порядок id = порядок вставки
        let entry = PointHistory {
            id: entries.len() as i64 + 1,
            user_id,
            amount,
            kind,
            occurred_at_millis,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn select_all_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PointHistory>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}
