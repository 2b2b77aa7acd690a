use std::time::{Duration, Instant};

use tracing::debug;

use crate::geometry::HazardPosition;

/// Whether a hazard message is currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackPhase {
    Idle,
    Active,
}

/// The qualifying hazard for one frame, reduced to what guidance needs.
#[derive(Debug, Clone, Copy)]
pub struct HazardCue {
    pub position: HazardPosition,
    pub distance_m: f32,
}

/// Cross-frame memory of the guidance engine. Owned and mutated only by
/// [`GuidanceEngine::observe`], once per frame.
#[derive(Debug, Clone)]
pub struct FeedbackState {
    phase: FeedbackPhase,
    last_message: Option<String>,
    last_emission: Option<Instant>,
}

impl FeedbackState {
    fn new() -> Self {
        Self {
            phase: FeedbackPhase::Idle,
            last_message: None,
            last_emission: None,
        }
    }
}

/// Converts per-frame hazard observations into a rate-limited, non-repetitive
/// stream of guidance messages.
///
/// Rules, evaluated once per frame:
/// 1. No hazard: drop to `Idle` and clear the last-message memory, even inside
///    the cooldown window. Losing the hazard is a reset, not a timeout.
/// 2. Hazard present: suppress inside the cooldown window; after it, suppress
///    exact repeats of the previous text (the embedded distance is part of the
///    text, so a 0.01 m change defeats the dedup); otherwise emit and restart
///    the cooldown.
///
/// The cooldown clock restarts only on emission, never on suppressed repeats.
pub struct GuidanceEngine {
    cooldown: Duration,
    state: FeedbackState,
}

impl GuidanceEngine {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: FeedbackState::new(),
        }
    }

    /// Feed one frame's qualifying hazard (or its absence) and the current
    /// wall-clock time. Returns the message to announce, if any.
    pub fn observe(&mut self, hazard: Option<HazardCue>, now: Instant) -> Option<String> {
        let cue = match hazard {
            Some(cue) => cue,
            None => {
                if self.state.last_message.is_some() {
                    debug!("Hazard left the frame, clearing guidance memory");
                }
                self.state.phase = FeedbackPhase::Idle;
                self.state.last_message = None;
                return None;
            }
        };

        let message = compose_message(cue.position, cue.distance_m);

        if let Some(last) = self.state.last_emission {
            if now.saturating_duration_since(last) < self.cooldown {
                debug!("Guidance suppressed: inside cooldown window");
                return None;
            }
        }

        if self.state.last_message.as_deref() == Some(message.as_str()) {
            debug!("Guidance suppressed: identical to previous announcement");
            return None;
        }

        self.state.last_message = Some(message.clone());
        self.state.last_emission = Some(now);
        self.state.phase = FeedbackPhase::Active;
        Some(message)
    }

    #[allow(dead_code)]
    pub fn phase(&self) -> FeedbackPhase {
        self.state.phase
    }
}

/// One literal template per side, distance embedded at two decimals.
pub fn compose_message(position: HazardPosition, distance_m: f32) -> String {
    match position {
        HazardPosition::Left => format!(
            "Pothole on the left, move right or walk straight. Distance: {:.2} meters.",
            distance_m
        ),
        HazardPosition::Right => format!(
            "Pothole on the right, move left or walk straight. Distance: {:.2} meters.",
            distance_m
        ),
        HazardPosition::Center => format!(
            "Pothole straight ahead, move left or right. Distance: {:.2} meters.",
            distance_m
        ),
    }
}
