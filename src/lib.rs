pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::calendar_views::CalendarViewService;
pub use application::event_service::EventService;
pub use application::pagination::{CursorPaginator, EventPage, RecurringEventPage};
pub use application::recurring_service::RecurringEventService;
pub use application::solidify::{SolidificationEngine, SolidifyFailure, SolidifyOutcome};
pub use application::time_buckets::LabelTimeBucketTracker;
pub use application::virtual_events::VirtualEventGenerator;
pub use domain::models::{
    BucketKey, Event, EventCursor, EventStatus, LabelTimeBucket, RecurringEvent,
    RecurringEventCursor, VirtualEvent,
};
pub use domain::recurrence::{Frequency, RecurrenceRule};
pub use domain::view::{CalendarEntry, DayBucket, WeekView};
pub use infrastructure::bucket_store::{
    InMemoryLabelTimeBucketStore, LabelTimeBucketStore, SqliteLabelTimeBucketStore,
};
pub use infrastructure::clock::{Clock, FixedClock, SystemClock};
pub use infrastructure::config::{load_engine_config, EngineConfig};
pub use infrastructure::error::CoreError;
pub use infrastructure::event_store::{EventStore, InMemoryEventStore, SqliteEventStore};
pub use infrastructure::recurring_store::{
    InMemoryRecurringEventStore, RecurringEventStore, SqliteRecurringEventStore,
};
pub use infrastructure::storage::initialize_database;
