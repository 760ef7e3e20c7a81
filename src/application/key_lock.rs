use dashmap::DashMap;
use log::{debug, warn};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock for key {key} not acquired within {waited:?}")]
    Timeout { key: String, waited: Duration },

    #[error("Waiting for lock on key {key} was interrupted")]
    Interrupted { key: String },
}

// Взаимное исключение по ключу. Мьютекс создаётся при первом обращении
// к ключу и живёт до конца процесса: записи никогда не удаляются, поэтому
// таблица растёт вместе с числом различных ключей.
pub struct KeyLockManager<K: Hash + Eq> {
    locks: DashMap<K, Arc<Mutex<()>>>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl<K> KeyLockManager<K>
where
    K: Hash + Eq + Clone + Debug,
{
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    // Прерывает всех, кто сейчас ждёт блокировку, и всех последующих
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // Выполняет `action`, удерживая блокировку `key`. Ожидание ограничено
    // `timeout`; при тайм-ауте или остановке менеджера `action` не вызывается.
    pub async fn run_exclusive<T, E, F, Fut>(&self, key: &K, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        self.run_exclusive_cancellable(key, &CancellationToken::new(), action)
            .await
    }

    // То же, что `run_exclusive`, но ожидание дополнительно прерывается `cancel`.
    pub async fn run_exclusive_cancellable<T, E, F, Fut>(
        &self,
        key: &K,
        cancel: &CancellationToken,
        action: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = self.acquire(key, cancel).await?;
        debug!("Lock acquired, key: {:?}", key);

        // Guard отпускается на любом выходе: Ok, Err, паника или drop future
        let result = action().await;

        drop(guard);
        debug!("Lock released, key: {:?}", key);
        result
    }

    fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(key) {
            return Arc::clone(lock.value());
        }
        // entry держит шард на запись, второй мьютекс для ключа не появится
        let entry = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    async fn acquire(
        &self,
        key: &K,
        cancel: &CancellationToken,
    ) -> Result<OwnedMutexGuard<()>, LockError> {
        let lock = self.lock_for(key);

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                warn!("Lock wait interrupted by shutdown, key: {:?}", key);
                Err(LockError::Interrupted { key: format!("{:?}", key) })
            }
            _ = cancel.cancelled() => {
                warn!("Lock wait cancelled, key: {:?}", key);
                Err(LockError::Interrupted { key: format!("{:?}", key) })
            }
            acquired = tokio::time::timeout(self.timeout, lock.lock_owned()) => match acquired {
                Ok(guard) => Ok(guard),
                Err(_) => {
                    warn!("Lock timeout after {:?}, key: {:?}", self.timeout, key);
                    Err(LockError::Timeout {
                        key: format!("{:?}", key),
                        waited: self.timeout,
                    })
                }
            },
        }
    }
}
