pub mod calendar_views;
pub mod event_service;
pub mod pagination;
pub mod recurring_service;
pub mod solidify;
pub mod time_buckets;
pub mod virtual_events;
