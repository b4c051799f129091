pub mod bucket_store;
pub mod clock;
pub mod config;
pub mod error;
pub mod event_store;
pub mod recurring_store;
pub mod storage;
