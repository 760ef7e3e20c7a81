pub mod key_lock;
pub mod point_service;
