//! Booking-site clock synchronisation for timed (Tatkal) bookings.
//!
//! The booking window opens on the *server's* clock, so the local machine
//! measures its offset from the site once and schedules against that.

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use reqwest::Client;
use reqwest::header::USER_AGENT;
use tracing::{info, warn};

use crate::engine::StopFlag;
use crate::error::ClockError;

/// The site's clock, expressed as an offset from the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerClock {
    offset: TimeDelta,
}

/// Wall-clock time the booking window opens: 10:00 for AC classes,
/// 11:00 for the rest.
pub fn booking_window_opens(ac: bool) -> NaiveTime {
    let hour = if ac { 10 } else { 11 };
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default()
}

impl ServerClock {
    pub fn local() -> Self {
        Self {
            offset: TimeDelta::zero(),
        }
    }

    pub fn with_offset(offset: TimeDelta) -> Self {
        Self { offset }
    }

    /// Ask the site for its time (epoch milliseconds as plain text).
    pub async fn synchronize(client: &Client, url: &str) -> Result<Self, ClockError> {
        let sent = Local::now();
        let body = client
            .get(url)
            .header(USER_AGENT, "Mozilla/5.0")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let received = Local::now();

        let body = body.trim();
        let millis: i64 = body.parse().map_err(|_| ClockError::Parse(body.to_string()))?;
        let server = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| ClockError::Parse(body.to_string()))?
            .with_timezone(&Local);

        // The server stamped its reply somewhere inside the round trip.
        let midpoint = sent + (received - sent) / 2;
        let clock = Self::with_offset(server - midpoint);
        info!(offset_ms = clock.offset.num_milliseconds(), "synchronized with server time");
        Ok(clock)
    }

    /// Like [`synchronize`](Self::synchronize), falling back to local time.
    pub async fn synchronize_or_local(client: &Client, url: &str) -> Self {
        match Self::synchronize(client, url).await {
            Ok(clock) => clock,
            Err(e) => {
                warn!(error = %e, "could not read server time, using local clock");
                Self::local()
            }
        }
    }

    pub fn offset(&self) -> TimeDelta {
        self.offset
    }

    /// Local instant at which the server clock shows `at` today, shifted by
    /// `shift_secs` (negative to fire early).
    pub fn local_instant_for(&self, at: NaiveTime, shift_secs: i64) -> DateTime<Local> {
        let today = Local::now().date_naive();
        let wall = today
            .and_time(at)
            .and_local_timezone(Local)
            .earliest()
            .unwrap_or_else(Local::now);
        wall - self.offset + TimeDelta::seconds(shift_secs)
    }

    /// Sleep until `target`. Returns `false` if stopped first.
    pub async fn wait_until(&self, target: DateTime<Local>, stop: &StopFlag) -> bool {
        let remaining = target - Local::now();
        let Ok(remaining) = remaining.to_std() else {
            warn!(target = %target.format("%H:%M:%S%.3f"), "target time is already in the past");
            return !stop.is_set();
        };
        info!(target = %target.format("%H:%M:%S%.3f"), "waiting for booking window");
        let reached = stop.sleep(remaining).await;
        if reached {
            info!(at = %Local::now().format("%H:%M:%S%.3f"), "booking window reached");
        }
        reached
    }
}
