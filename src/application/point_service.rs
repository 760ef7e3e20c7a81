use crate::application::key_lock::KeyLockManager;
use crate::domain::now_millis;
use crate::domain::point_error::PointError;
use crate::domain::point_history_repository::{
    PointHistory, PointHistoryRepository, TransactionType,
};
use crate::domain::user_point_repository::{UserPoint, UserPointRepository};
use crate::domain::UserId;
use log::{debug, error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_POINT: i64 = 10_000;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(3_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointPolicy {
    pub max_point: i64,
    pub lock_timeout: Duration,
}

impl Default for PointPolicy {
    fn default() -> Self {
        Self {
            max_point: DEFAULT_MAX_POINT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

pub struct PointService {
    user_points: Arc<dyn UserPointRepository>,
    histories: Arc<dyn PointHistoryRepository>,
    locks: KeyLockManager<UserId>,
    max_point: i64,
    history_failures: AtomicU64,
}

impl PointService {
    pub fn new(
        user_points: Arc<dyn UserPointRepository>,
        histories: Arc<dyn PointHistoryRepository>,
        policy: PointPolicy,
    ) -> Self {
        Self {
            user_points,
            histories,
            locks: KeyLockManager::new(policy.lock_timeout),
            max_point: policy.max_point,
            history_failures: AtomicU64::new(0),
        }
    }

    // Чтения идут мимо блокировки
    pub async fn point(&self, id: UserId) -> Result<UserPoint, PointError> {
        Ok(self.user_points.select_by_id(id).await?)
    }

    pub async fn history(&self, id: UserId) -> Result<Vec<PointHistory>, PointError> {
        Ok(self.histories.select_all_by_user_id(id).await?)
    }

    pub async fn charge(&self, id: UserId, amount: i64) -> Result<UserPoint, PointError> {
        self.mutate(id, amount, TransactionType::Charge, &CancellationToken::new())
            .await
    }

    pub async fn use_point(&self, id: UserId, amount: i64) -> Result<UserPoint, PointError> {
        self.mutate(id, amount, TransactionType::Use, &CancellationToken::new())
            .await
    }

    // Как `charge`, но ожидание блокировки прерывается через `cancel`.
    pub async fn charge_cancellable(
        &self,
        id: UserId,
        amount: i64,
        cancel: &CancellationToken,
    ) -> Result<UserPoint, PointError> {
        self.mutate(id, amount, TransactionType::Charge, cancel).await
    }

    pub async fn use_point_cancellable(
        &self,
        id: UserId,
        amount: i64,
        cancel: &CancellationToken,
    ) -> Result<UserPoint, PointError> {
        self.mutate(id, amount, TransactionType::Use, cancel).await
    }

    // Сколько записей истории не удалось сохранить с момента запуска.
    pub fn history_failures(&self) -> u64 {
        self.history_failures.load(Ordering::Relaxed)
    }

    pub fn lock_count(&self) -> usize {
        self.locks.lock_count()
    }

    pub fn shutdown(&self) {
        self.locks.shutdown();
    }

    async fn mutate(
        &self,
        id: UserId,
        amount: i64,
        kind: TransactionType,
        cancel: &CancellationToken,
    ) -> Result<UserPoint, PointError> {
        // Некорректная сумма отсекается до блокировки и до хранилища
        if amount <= 0 {
            return Err(PointError::InvalidAmount(amount));
        }

        self.locks
            .run_exclusive_cancellable(&id, cancel, || self.apply(id, amount, kind))
            .await
    }

    // Выполняется только под блокировкой пользователя
    async fn apply(
        &self,
        id: UserId,
        amount: i64,
        kind: TransactionType,
    ) -> Result<UserPoint, PointError> {
        // 1. Текущий баланс
        let current = self.user_points.select_by_id(id).await?;

        // 2. Новое значение и проверка границ до любой записи
        let candidate = self.candidate(current.point, amount, kind)?;

        // 3. Запись баланса
        let updated = self.user_points.insert_or_update(id, candidate).await?;

        // 4. История: ошибка только логируется
        self.record_history(id, amount, kind).await;

        info!(
            "{} {} for user {}: {} -> {}",
            kind, amount, id, current.point, updated.point
        );
        Ok(updated)
    }

    fn candidate(&self, current: i64, amount: i64, kind: TransactionType) -> Result<i64, PointError> {
        match kind {
            TransactionType::Charge => match current.checked_add(amount) {
                Some(next) if next <= self.max_point => Ok(next),
                _ => Err(PointError::BalanceExceeded {
                    current,
                    amount,
                    max: self.max_point,
                }),
            },
            TransactionType::Use => match current.checked_sub(amount) {
                Some(next) if next >= 0 => Ok(next),
                _ => Err(PointError::InsufficientBalance { current, amount }),
            },
        }
    }

    async fn record_history(&self, id: UserId, amount: i64, kind: TransactionType) {
        match self.histories.insert(id, amount, kind, now_millis()).await {
            Ok(entry) => debug!("History #{} recorded for user {}", entry.id, id),
            Err(e) => {
                self.history_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Failed to record {} of {} for user {}: {}",
                    kind, amount, id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user_point_repository::StoreError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockUserPoints {
        points: Mutex<HashMap<UserId, i64>>,
        selects: AtomicUsize,
        updates: AtomicUsize,
        fail_writes: bool,
    }

    impl MockUserPoints {
        fn with_point(id: UserId, point: i64) -> Self {
            let mock = Self::default();
            mock.points.lock().unwrap().insert(id, point);
            mock
        }
    }

    #[async_trait]
    impl UserPointRepository for MockUserPoints {
        async fn select_by_id(&self, id: UserId) -> Result<UserPoint, StoreError> {
            self.selects.fetch_add(1, Ordering::SeqCst);
            let point = *self.points.lock().unwrap().entry(id).or_insert(0);
            Ok(UserPoint {
                id,
                point,
                updated_at_millis: 0,
            })
        }

        async fn insert_or_update(&self, id: UserId, point: i64) -> Result<UserPoint, StoreError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(StoreError::Unavailable("write refused".into()));
            }
            self.points.lock().unwrap().insert(id, point);
            Ok(UserPoint {
                id,
                point,
                updated_at_millis: now_millis(),
            })
        }
    }

    #[derive(Default)]
    struct MockHistories {
        entries: Mutex<Vec<PointHistory>>,
        broken: bool,
    }

    #[async_trait]
    impl PointHistoryRepository for MockHistories {
        async fn insert(
            &self,
            user_id: UserId,
            amount: i64,
            kind: TransactionType,
            occurred_at_millis: i64,
        ) -> Result<PointHistory, StoreError> {
            if self.broken {
                return Err(StoreError::Unavailable("history table down".into()));
            }
            let mut entries = self.entries.lock().unwrap();
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
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .iter()
                .filter(|e| e.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    fn service(points: Arc<MockUserPoints>, histories: Arc<MockHistories>) -> PointService {
        PointService::new(points, histories, PointPolicy::default())
    }

    #[tokio::test]
    async fn point_returns_stored_balance() {
        let points = Arc::new(MockUserPoints::with_point(1, 6000));
        let svc = service(points.clone(), Arc::new(MockHistories::default()));

        let result = svc.point(1).await.unwrap();

        assert_eq!(result.point, 6000);
        assert_eq!(points.selects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn history_returns_only_users_entries() {
        let histories = Arc::new(MockHistories::default());
        histories
            .insert(1, 1000, TransactionType::Charge, 10)
            .await
            .unwrap();
        histories
            .insert(2, 500, TransactionType::Charge, 11)
            .await
            .unwrap();
        let svc = service(Arc::new(MockUserPoints::default()), histories);

        let result = svc.history(1).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].amount, 1000);
        assert_eq!(result[0].kind, TransactionType::Charge);
    }

    #[tokio::test]
    async fn non_positive_amount_fails_without_store_access() {
        let points = Arc::new(MockUserPoints::with_point(1, 6000));
        let svc = service(points.clone(), Arc::new(MockHistories::default()));

        for amount in [-5, 0] {
            assert!(matches!(
                svc.charge(1, amount).await,
                Err(PointError::InvalidAmount(a)) if a == amount
            ));
            assert!(matches!(
                svc.use_point(1, amount).await,
                Err(PointError::InvalidAmount(_))
            ));
        }

        assert_eq!(points.selects.load(Ordering::SeqCst), 0);
        assert_eq!(svc.lock_count(), 0);
    }

    #[tokio::test]
    async fn charge_over_max_leaves_balance_unchanged() {
        let points = Arc::new(MockUserPoints::with_point(1, 6000));
        let histories = Arc::new(MockHistories::default());
        let svc = service(points.clone(), histories.clone());

        let result = svc.charge(1, 5000).await;

        assert!(matches!(
            result,
            Err(PointError::BalanceExceeded {
                current: 6000,
                amount: 5000,
                max: 10_000
            })
        ));
        assert_eq!(points.updates.load(Ordering::SeqCst), 0);
        assert_eq!(svc.point(1).await.unwrap().point, 6000);
        assert!(histories.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn charge_adds_amount_and_records_history() {
        let points = Arc::new(MockUserPoints::with_point(1, 6000));
        let histories = Arc::new(MockHistories::default());
        let svc = service(points.clone(), histories.clone());

        let result = svc.charge(1, 1000).await.unwrap();

        assert_eq!(result.point, 7000);
        let entries = histories.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TransactionType::Charge);
        assert_eq!(entries[0].amount, 1000);
        assert_eq!(entries[0].user_id, 1);
    }

    #[tokio::test]
    async fn charge_up_to_max_is_allowed() {
        let svc = service(
            Arc::new(MockUserPoints::with_point(1, 6000)),
            Arc::new(MockHistories::default()),
        );

        assert_eq!(svc.charge(1, 4000).await.unwrap().point, 10_000);
        assert!(matches!(
            svc.charge(1, 1).await,
            Err(PointError::BalanceExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn overflowing_charge_is_rejected_as_exceeded() {
        let points = Arc::new(MockUserPoints::with_point(1, 6000));
        let svc = PointService::new(
            points.clone(),
            Arc::new(MockHistories::default()),
            PointPolicy {
                max_point: i64::MAX,
                lock_timeout: DEFAULT_LOCK_TIMEOUT,
            },
        );

        let result = svc.charge(1, i64::MAX).await;

        assert!(matches!(
            result,
            Err(PointError::BalanceExceeded {
                current: 6000,
                amount: i64::MAX,
                ..
            })
        ));
        assert_eq!(points.updates.load(Ordering::SeqCst), 0);
        assert_eq!(svc.point(1).await.unwrap().point, 6000);
    }

    #[tokio::test]
    async fn use_more_than_balance_fails() {
        let points = Arc::new(MockUserPoints::with_point(1, 6000));
        let svc = service(points.clone(), Arc::new(MockHistories::default()));

        let result = svc.use_point(1, 7000).await;

        assert!(matches!(
            result,
            Err(PointError::InsufficientBalance {
                current: 6000,
                amount: 7000
            })
        ));
        assert_eq!(points.updates.load(Ordering::SeqCst), 0);
        assert_eq!(svc.point(1).await.unwrap().point, 6000);
    }

    #[tokio::test]
    async fn use_subtracts_amount_and_records_history() {
        let histories = Arc::new(MockHistories::default());
        let svc = service(Arc::new(MockUserPoints::with_point(1, 6000)), histories.clone());

        assert_eq!(svc.use_point(1, 1000).await.unwrap().point, 5000);
        assert_eq!(svc.use_point(1, 5000).await.unwrap().point, 0);

        let entries = histories.entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.kind == TransactionType::Use));
    }

    #[tokio::test]
    async fn history_failure_keeps_balance_write() {
        let histories = Arc::new(MockHistories {
            broken: true,
            ..Default::default()
        });
        let svc = service(Arc::new(MockUserPoints::with_point(1, 100)), histories);

        let result = svc.charge(1, 50).await.unwrap();

        assert_eq!(result.point, 150);
        assert_eq!(svc.point(1).await.unwrap().point, 150);
        assert_eq!(svc.history_failures(), 1);
    }

    #[tokio::test]
    async fn balance_write_failure_is_surfaced_without_history() {
        let points = Arc::new(MockUserPoints {
            fail_writes: true,
            ..Default::default()
        });
        let histories = Arc::new(MockHistories::default());
        let svc = service(points, histories.clone());

        let result = svc.charge(1, 10).await;

        assert!(matches!(result, Err(PointError::Store(_))));
        assert!(histories.entries.lock().unwrap().is_empty());
        // Блокировка отпущена, следующий вызов не ждёт тайм-аут
        assert!(matches!(svc.charge(1, 10).await, Err(PointError::Store(_))));
    }

    #[tokio::test]
    async fn shutdown_fails_mutations_as_concurrency_error() {
        let svc = service(
            Arc::new(MockUserPoints::default()),
            Arc::new(MockHistories::default()),
        );
        svc.shutdown();

        let result = svc.charge(1, 10).await;

        assert!(matches!(result, Err(PointError::Concurrency(_))));
        assert_eq!(svc.point(1).await.unwrap().point, 0);
    }
}
