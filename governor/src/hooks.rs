//! Injected clock and id-generation hooks.
//!
//! Artifact producers and trace emitters take their timestamps and ids from
//! these hooks so runs are reproducible under test. The hooks themselves are
//! fault-tolerant: a failing clock falls back to real time and a failing id
//! factory falls back to a generated UUID, so a broken hook can never fail a
//! governed operation.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

pub type ClockHook = Box<dyn Fn() -> Result<DateTime<Utc>> + Send + Sync>;
pub type IdHook = Box<dyn Fn() -> Result<String> + Send + Sync>;

/// Clock and id sources for one producer.
pub struct Hooks {
    clock: Option<ClockHook>,
    id_gen: Option<IdHook>,
}

impl Hooks {
    /// Real wall clock and random UUIDs.
    pub fn real() -> Self {
        Self {
            clock: None,
            id_gen: None,
        }
    }

    pub fn with_clock(mut self, clock: ClockHook) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_gen(mut self, id_gen: IdHook) -> Self {
        self.id_gen = Some(id_gen);
        self
    }

    /// Current UTC time; falls back to the real clock if the hook fails.
    pub fn now_utc(&self) -> DateTime<Utc> {
        match &self.clock {
            Some(clock) => match clock() {
                Ok(now) => now,
                Err(err) => {
                    warn!(error = %err, "clock hook failed, falling back to real time");
                    Utc::now()
                }
            },
            None => Utc::now(),
        }
    }

    /// Current UTC time as an RFC 3339 string with millisecond precision.
    pub fn now_rfc3339(&self) -> String {
        self.now_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Fresh id; falls back to a generated UUID if the hook fails.
    pub fn new_id(&self) -> String {
        match &self.id_gen {
            Some(id_gen) => match id_gen() {
                Ok(id) => id,
                Err(err) => {
                    warn!(error = %err, "id hook failed, falling back to generated id");
                    Uuid::new_v4().to_string()
                }
            },
            None => Uuid::new_v4().to_string(),
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::real()
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("clock", &self.clock.is_some())
            .field("id_gen", &self.id_gen.is_some())
            .finish()
    }
}
