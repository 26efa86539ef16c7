//! Wall-clock abstraction
//!
//! Every component reads time through [`Clock`] so tests can pin it.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as RFC 3339 / ISO-8601 UTC with millisecond
    /// precision and a trailing `Z`, e.g. `2024-01-01T12:00:00.000Z`.
    fn now_iso(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Shared, reference-counted clock
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Create a shared system clock
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}


#[cfg(test)]
mod tests {
    use super::manual::ManualClock;
    use super::*;

    #[test]
    fn iso_format_has_millis_and_z() {
        let clock = ManualClock::fixed();
        assert_eq!(clock.now_iso(), "2024-01-01T12:00:00.000Z");
    }

    #[test]
    fn advance_moves_the_clock() {
        let clock = ManualClock::fixed();
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now_iso(), "2024-01-01T12:01:30.000Z");
    }

    #[test]
    fn system_clock_is_utc() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
