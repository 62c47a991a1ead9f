//! Time source used for cache expiry and entity timestamps.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
  now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: std::sync::Mutex::new(start),
    }
  }

  /// A clock starting at 2024-01-01T00:00:00Z.
  pub fn epoch() -> Self {
    let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
      .expect("valid timestamp")
      .with_timezone(&Utc);
    Self::new(start)
  }

  pub fn advance(&self, by: chrono::Duration) {
    let mut now = self.now.lock().expect("clock lock");
    *now += by;
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().expect("clock lock")
  }
}
