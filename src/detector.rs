use crate::messages::{EventKind, PresenceState, SensorReading, TransitionEvent};

/// Value the sensor reports while it sees motion.
pub const RAW_MOTION: &str = "pir";
/// Value the sensor reports while idle.
pub const RAW_IDLE: &str = "none";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// The presence state changed.
    Transition(TransitionEvent),
    /// Same state as the previous cycle; nothing to report.
    Steady,
    /// The sensor sent a value outside the recognized set.
    UnexpectedValue(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detection {
    pub signal: Signal,
    pub next: PresenceState,
}

/// Decides what a new reading means given the previous state.
///
/// The returned `next` is always the state observed in `reading`, including
/// `Unknown`, so an unrecognized value replaces the last known real state.
pub fn detect(previous: PresenceState, reading: &SensorReading) -> Detection {
    let (next, kind) = match reading.raw.as_str() {
        RAW_MOTION => (PresenceState::Present, EventKind::MotionDetected),
        RAW_IDLE => (PresenceState::Absent, EventKind::NoMotion),
        other => {
            return Detection {
                signal: Signal::UnexpectedValue(other.to_string()),
                next: PresenceState::Unknown,
            };
        }
    };

    let signal = if previous == next {
        Signal::Steady
    } else {
        Signal::Transition(TransitionEvent {
            kind,
            from: previous,
            to: next,
            timestamp: reading.polled_at,
        })
    };

    Detection { signal, next }
}
