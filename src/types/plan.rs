//! Scheduled passes and their timing window

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{GatewayError, Result};

/// Wall-clock timestamp as seconds and nanoseconds since the Unix epoch.
///
/// Mirrors the platform's timestamp representation so plans can be read
/// straight from its listings. Range checks happen in [`Timestamp::to_system_time`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Timestamp {
    pub seconds: i64,
    #[serde(default)]
    pub nanos: i32,
}

impl Timestamp {
    /// 0001-01-01T00:00:00Z
    pub const MIN_SECONDS: i64 = -62_135_596_800;
    /// 9999-12-31T23:59:59Z
    pub const MAX_SECONDS: i64 = 253_402_300_799;

    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self {
                seconds: after.as_secs() as i64,
                nanos: after.subsec_nanos() as i32,
            },
            Err(before) => {
                let before = before.duration();
                let mut seconds = -(before.as_secs() as i64);
                let mut nanos = before.subsec_nanos() as i32;
                if nanos > 0 {
                    seconds -= 1;
                    nanos = 1_000_000_000 - nanos;
                }
                Self { seconds, nanos }
            }
        }
    }

    /// Convert to [`SystemTime`], rejecting values outside the valid range.
    pub fn to_system_time(self) -> std::result::Result<SystemTime, String> {
        if !(Self::MIN_SECONDS..=Self::MAX_SECONDS).contains(&self.seconds) {
            return Err(format!("timestamp seconds {} out of range", self.seconds));
        }
        if !(0..1_000_000_000).contains(&self.nanos) {
            return Err(format!("timestamp nanos {} out of range", self.nanos));
        }

        let nanos = Duration::from_nanos(self.nanos as u64);
        let time = if self.seconds >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_secs(self.seconds as u64) + nanos)
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(self.seconds.unsigned_abs()))
                .and_then(|t| t.checked_add(nanos))
        };

        time.ok_or_else(|| format!("timestamp {self} not representable on this platform"))
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        Timestamp::from_system_time(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

/// A scheduled communication pass, as supplied by the plan source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Plan {
    /// Unique plan identifier assigned by the platform
    pub plan_id: String,
    /// Satellite the pass is scheduled for
    #[serde(default)]
    pub satellite_id: Option<String>,
    /// Communications channel used during the pass
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Acquisition of signal
    #[serde(default)]
    pub aos_time: Option<Timestamp>,
    /// Loss of signal
    #[serde(default)]
    pub los_time: Option<Timestamp>,
    /// Downlink radio center frequency
    #[serde(default)]
    pub downlink_center_frequency_hz: u64,
}

impl Plan {
    /// Create a plan with the given AOS/LOS window.
    pub fn new(plan_id: impl Into<String>, aos: SystemTime, los: SystemTime) -> Self {
        Self {
            plan_id: plan_id.into(),
            satellite_id: None,
            channel_id: None,
            aos_time: Some(aos.into()),
            los_time: Some(los.into()),
            downlink_center_frequency_hz: 0,
        }
    }

    pub fn with_downlink_frequency(mut self, hz: u64) -> Self {
        self.downlink_center_frequency_hz = hz;
        self
    }

    pub fn with_satellite(mut self, satellite_id: impl Into<String>) -> Self {
        self.satellite_id = Some(satellite_id.into());
        self
    }

    /// Parse and validate the AOS/LOS window.
    ///
    /// Fails when either timestamp is missing or out of range, or when AOS
    /// falls after LOS. A plan that fails here must never start a session.
    pub fn window(&self) -> Result<PassWindow> {
        let aos = self.parse_timestamp("AOS", self.aos_time)?;
        let los = self.parse_timestamp("LOS", self.los_time)?;

        if aos > los {
            return Err(GatewayError::invalid_plan(
                &self.plan_id,
                format!("AOS {} is after LOS {}", Timestamp::from(aos), Timestamp::from(los)),
            ));
        }

        Ok(PassWindow { aos, los })
    }

    fn parse_timestamp(&self, label: &str, value: Option<Timestamp>) -> Result<SystemTime> {
        let value = value
            .ok_or_else(|| GatewayError::invalid_plan(&self.plan_id, format!("missing {label}")))?;
        value.to_system_time().map_err(|reason| {
            GatewayError::invalid_plan(&self.plan_id, format!("{label}: {reason}"))
        })
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plan ID: {}", self.plan_id)?;
        if let Some(satellite) = &self.satellite_id {
            write!(f, ", Satellite: {satellite}")?;
        }
        match (self.aos_time, self.los_time) {
            (Some(aos), Some(los)) => write!(f, ", AOS: {aos}, LOS: {los}"),
            _ => f.write_str(", AOS/LOS: unknown"),
        }
    }
}

/// Validated AOS/LOS window of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassWindow {
    pub aos: SystemTime,
    pub los: SystemTime,
}

impl PassWindow {
    /// Convert both wall-clock deadlines to monotonic instants.
    ///
    /// The conversion reads the clocks once; waiting on the returned instants
    /// resolves at the absolute deadline no matter how late the wait starts.
    pub fn deadlines(&self) -> (tokio::time::Instant, tokio::time::Instant) {
        let now_wall = SystemTime::now();
        let now = tokio::time::Instant::now();
        (instant_at(self.aos, now_wall, now), instant_at(self.los, now_wall, now))
    }

    /// Whether LOS is already behind `now`.
    pub fn has_ended(&self, now: SystemTime) -> bool {
        self.los < now
    }
}

// Roughly thirty years; keeps `Instant` arithmetic clear of overflow.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn instant_at(
    deadline: SystemTime,
    now_wall: SystemTime,
    now: tokio::time::Instant,
) -> tokio::time::Instant {
    match deadline.duration_since(now_wall) {
        Ok(ahead) => now + ahead.min(FAR_FUTURE),
        Err(_) => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn window_requires_both_timestamps() {
        let mut plan = Plan::new("p1", SystemTime::now(), SystemTime::now());
        plan.los_time = None;

        let error = plan.window().expect_err("missing LOS must be rejected");
        assert!(error.to_string().contains("missing LOS"));
        assert!(error.to_string().contains("p1"));
    }

    #[test]
    fn window_rejects_aos_after_los() {
        let now = SystemTime::now();
        let plan = Plan::new("p2", now + Duration::from_secs(60), now);

        assert!(matches!(plan.window(), Err(GatewayError::InvalidPlan { .. })));
    }

    #[test]
    fn window_rejects_out_of_range_nanos() {
        let mut plan = Plan::new("p3", SystemTime::now(), SystemTime::now());
        plan.aos_time = Some(Timestamp::new(1_700_000_000, 1_000_000_000));

        assert!(plan.window().is_err());
    }

    #[test]
    fn equal_aos_and_los_is_a_valid_window() {
        let now = SystemTime::now();
        let window = Plan::new("p4", now, now).window().expect("AOS == LOS is allowed");
        assert_eq!(window.aos, window.los);
    }

    #[test]
    fn past_deadlines_resolve_immediately() {
        let past = SystemTime::now() - Duration::from_secs(3600);
        let window = PassWindow {
            aos: past,
            los: past,
        };
        let before = tokio::time::Instant::now();
        let (aos, los) = window.deadlines();

        assert!(aos <= tokio::time::Instant::now());
        assert!(aos >= before);
        assert_eq!(aos, los);
    }

    #[test]
    fn future_deadlines_keep_their_distance() {
        let now = SystemTime::now();
        let window = PassWindow {
            aos: now + Duration::from_secs(10),
            los: now + Duration::from_secs(70),
        };
        let (aos, los) = window.deadlines();

        assert_eq!(los - aos, Duration::from_secs(60));
    }

    #[test]
    fn plan_deserializes_from_platform_listing() {
        let yaml = "PlanId: abc\n\
                    AosTime: {Seconds: 100, Nanos: 5}\n\
                    LosTime: {Seconds: 200}\n\
                    DownlinkCenterFrequencyHz: 437500000\n";
        let plan: Plan = serde_yaml_ng::from_str(yaml).expect("plan yaml");

        assert_eq!(plan.plan_id, "abc");
        assert_eq!(plan.aos_time, Some(Timestamp::new(100, 5)));
        assert_eq!(plan.los_time, Some(Timestamp::new(200, 0)));
        assert_eq!(plan.downlink_center_frequency_hz, 437_500_000);
        assert!(plan.satellite_id.is_none());
    }

    proptest! {
        #[test]
        fn timestamps_survive_system_time_conversion(
            seconds in -1_000_000_000i64..4_000_000_000i64,
            nanos in 0i32..1_000_000_000i32
        ) {
            let ts = Timestamp::new(seconds, nanos);
            let time = ts.to_system_time().expect("in range");
            prop_assert_eq!(Timestamp::from_system_time(time), ts);
        }
    }
}
