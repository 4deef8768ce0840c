//! Pass session states and counters

use std::fmt;

/// Why a pass session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    /// The LOS deadline elapsed.
    Los,
    /// The session or one of its parents was stopped.
    Cancelled,
    /// The platform refused to open a stream at AOS; the pass was skipped.
    StreamOpenFailed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EndReason::Los => "LOS",
            EndReason::Cancelled => "cancelled",
            EndReason::StreamOpenFailed => "stream open failed",
        })
    }
}

/// Lifecycle of a pass session.
///
/// ```text
/// Scheduled ──► WaitingForAos ──► Active ──► Ended(Los | Cancelled)
///                     │
///                     └──────────────────► Ended(Cancelled | StreamOpenFailed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassState {
    Scheduled,
    WaitingForAos,
    Active,
    Ended(EndReason),
}

impl PassState {
    pub fn is_active(&self) -> bool {
        matches!(self, PassState::Active)
    }

    /// `Ended` is terminal; no transition leaves it.
    pub fn is_ended(&self) -> bool {
        matches!(self, PassState::Ended(_))
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassState::Scheduled => f.write_str("scheduled"),
            PassState::WaitingForAos => f.write_str("waiting for AOS"),
            PassState::Active => f.write_str("active"),
            PassState::Ended(reason) => write!(f, "ended ({reason})"),
        }
    }
}

/// Traffic counters of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Frames taken from the data channel while active
    pub frames_received: u64,
    /// Telemetry requests the platform accepted
    pub frames_sent: u64,
    /// Payload bytes the platform accepted
    pub bytes_sent: u64,
    /// Telemetry requests the platform rejected
    pub send_failures: u64,
    /// Commands queued to at least one ground connection
    pub commands_forwarded: u64,
    /// Commands with no ground connection to take them
    pub commands_dropped: u64,
}

/// Final outcome of a pass session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub channel: String,
    pub plan_id: String,
    pub reason: EndReason,
    pub stats: PassStats,
}
