use super::user_point_repository::StoreError;
use super::UserId;
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Charge,
    Use,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Charge => "CHARGE",
            TransactionType::Use => "USE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CHARGE" => Some(TransactionType::Charge),
            "USE" => Some(TransactionType::Use),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointHistory {
    pub id: i64,
    pub user_id: UserId,
    pub amount: i64,
    pub kind: TransactionType,
    pub occurred_at_millis: i64,
}

// Журнал изменений баланса, только добавление.
#[async_trait]
pub trait PointHistoryRepository: Send + Sync {
    async fn insert(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionType,
        occurred_at_millis: i64,
    ) -> Result<PointHistory, StoreError>;

    // Записи пользователя в порядке добавления.
    async fn select_all_by_user_id(&self, user_id: UserId)
        -> Result<Vec<PointHistory>, StoreError>;
}
