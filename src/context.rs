// Circulation Core - School Library Circulation Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Request-scoped context
//!
//! Every core operation that depends on time or is worth auditing takes a
//! [`RequestContext`]. The clock is captured once per request so due dates,
//! overdue checks and durations inside one operation agree with each other.

use crate::error::{CirculationError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who is acting on the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    /// Librarian or teacher terminal
    Staff { user_id: i64 },
    /// Student using self-checkout
    Student { student_id: i64 },
    /// Unattended kiosk or scanner station
    Kiosk,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Staff { user_id } => write!(f, "staff:{}", user_id),
            Actor::Student { student_id } => write!(f, "student:{}", student_id),
            Actor::Kiosk => f.write_str("kiosk"),
        }
    }
}

/// Context passed into each core operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub actor: Actor,
    /// Clock reading for the whole request
    pub now: DateTime<Utc>,
}

impl RequestContext {
    /// New context stamped with the current time
    pub fn new(actor: Actor) -> Self {
        Self::at(actor, Utc::now())
    }

    /// New context with a pinned clock
    pub fn at(actor: Actor, now: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor,
            now,
        }
    }

    /// `now` shifted by whole days
    ///
    /// Returns `InvalidInput` when the result leaves chrono's range.
    pub fn days_from_now(&self, days: i64) -> Result<DateTime<Utc>> {
        Duration::try_days(days)
            .and_then(|delta| self.now.checked_add_signed(delta))
            .ok_or_else(|| CirculationError::invalid_input(format!("{} days from now is out of range", days)))
    }

    /// Same request, clock replaced
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;

    #[test]
    fn test_pinned_clock() {
        let now = Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap();
        let ctx = RequestContext::at(Actor::Kiosk, now);
        assert_eq!(ctx.now, now);
        assert_ne!(ctx.request_id, RequestContext::at(Actor::Kiosk, now).request_id);
    }

    #[test]
    fn test_days_from_now() {
        let now = Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap();
        let ctx = RequestContext::at(Actor::Kiosk, now);

        assert_eq!(ctx.days_from_now(14).unwrap(), Utc.with_ymd_and_hms(2024, 9, 15, 8, 0, 0).unwrap());
        assert_eq!(ctx.days_from_now(100_000_000).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(ctx.days_from_now(i64::MAX).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_actor_display() {
        assert_eq!(Actor::Staff { user_id: 7 }.to_string(), "staff:7");
        assert_eq!(Actor::Student { student_id: 12 }.to_string(), "student:12");
        assert_eq!(Actor::Kiosk.to_string(), "kiosk");
    }
}
