pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::key_lock::{KeyLockManager, LockError};
pub use application::point_service::{PointPolicy, PointService};
pub use domain::point_error::PointError;
pub use domain::point_history_repository::{PointHistory, PointHistoryRepository, TransactionType};
pub use domain::user_point_repository::{StoreError, UserPoint, UserPointRepository};
pub use domain::UserId;
