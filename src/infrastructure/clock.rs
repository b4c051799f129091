use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::error::CoreError;

/// Injectable time source. Every component reads "now" and owner timezones
/// through this trait so tests can pin both.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn zone_for(&self, owner_id: Uuid) -> Tz;
}

pub struct SystemClock {
    default_zone: Tz,
    zones: Mutex<HashMap<Uuid, Tz>>,
}

impl SystemClock {
    pub fn new(default_zone: Tz) -> Self {
        Self {
            default_zone,
            zones: Mutex::new(HashMap::new()),
        }
    }

    /// Default zone comes from the configured fallback; per-owner zones are
    /// registered on top.
    pub fn from_config(config: &EngineConfig) -> Result<Self, CoreError> {
        let zone = config.fallback_timezone.parse::<Tz>().map_err(|error| {
            CoreError::Validation(format!(
                "unknown fallback timezone '{}': {error}",
                config.fallback_timezone
            ))
        })?;
        Ok(Self::new(zone))
    }

    pub fn set_zone(&self, owner_id: Uuid, zone: Tz) {
        if let Ok(mut zones) = self.zones.lock() {
            zones.insert(owner_id, zone);
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn zone_for(&self, owner_id: Uuid) -> Tz {
        self.zones
            .lock()
            .ok()
            .and_then(|zones| zones.get(&owner_id).copied())
            .unwrap_or(self.default_zone)
    }
}

#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    zone: Tz,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, zone: Tz) -> Self {
        Self {
            now: Mutex::new(now),
            zone,
        }
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }

    fn zone_for(&self, _owner_id: Uuid) -> Tz {
        self.zone
    }
}
