use std::fmt;

use chrono::{DateTime, Local};

/// What the monitor currently believes about occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceState {
    Absent,
    Present,
    /// The sensor reported something outside the recognized set.
    Unknown,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PresenceState::Absent => "absent",
            PresenceState::Present => "present",
            PresenceState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Raw "pir" datapoint value plus the time of the poll that produced it.
#[derive(Clone, Debug)]
pub struct SensorReading {
    pub raw: String,
    pub polled_at: DateTime<Local>,
}

impl SensorReading {
    pub fn new(raw: impl Into<String>, polled_at: DateTime<Local>) -> Self {
        SensorReading {
            raw: raw.into(),
            polled_at,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Entry into `Present`. The only kind that produces an audible alert.
    MotionDetected,
    /// Entry into `Absent`. Logged only.
    NoMotion,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionEvent {
    pub kind: EventKind,
    pub from: PresenceState,
    pub to: PresenceState,
    pub timestamp: DateTime<Local>,
}

/// Text handed to the notification worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub text: String,
}

impl Alert {
    pub fn new(text: impl Into<String>) -> Self {
        Alert { text: text.into() }
    }
}
