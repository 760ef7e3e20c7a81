pub mod point_error;
pub mod point_history_repository;
pub mod user_point_repository;

use std::time::{SystemTime, UNIX_EPOCH};

pub type UserId = i64;

// Миллисекунды с начала эпохи; часы до 1970 года считаем нулём
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
