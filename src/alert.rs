//! Spoken proximity alerts.
//!
//! The speech engine itself is external; this module decides what to say and
//! when. The same object in the same distance band is announced at most once
//! per cooldown window, so a detection that persists across frames is not
//! repeated every frame. A different object, or the same object moving into
//! another band, is announced right away.

use std::time::{Duration, Instant};

use crate::detect::Detection;

pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_millis(5000);
/// Upper bound of the "near" band, in meters.
pub const DEFAULT_NEAR_LIMIT_M: f32 = 0.3;
/// Upper bound of the "medium" band, in meters.
pub const DEFAULT_FAR_LIMIT_M: f32 = 0.6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Proximity {
    Near,
    Medium,
    Far,
}

/// Output side of the speech engine.
pub trait SpeechSink {
    fn speak(&mut self, text: &str);
}

/// Speech sink that writes utterances to the log.
#[derive(Default)]
pub struct LogSpeech;

impl SpeechSink for LogSpeech {
    fn speak(&mut self, text: &str) {
        log::info!("speak: {}", text);
    }
}

/// Phrase construction and distance banding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlertPolicy {
    pub near_limit_m: f32,
    pub far_limit_m: f32,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            near_limit_m: DEFAULT_NEAR_LIMIT_M,
            far_limit_m: DEFAULT_FAR_LIMIT_M,
        }
    }
}

impl AlertPolicy {
    /// Band for a fused distance. Unknown or non-positive distances have no band.
    pub fn proximity(&self, distance: Option<f32>) -> Option<Proximity> {
        let d = distance.filter(|d| *d > 0.0)?;
        Some(if d < self.near_limit_m {
            Proximity::Near
        } else if d < self.far_limit_m {
            Proximity::Medium
        } else {
            Proximity::Far
        })
    }

    pub fn phrase(&self, detection: &Detection) -> String {
        match detection.distance.filter(|d| *d > 0.0) {
            Some(d) => format!("{} detected, {:.1} meters away", detection.name, d),
            None => format!("{} detected, Distance Unknown", detection.name),
        }
    }
}

/// Cooldown gate: admits one event per `cooldown` window.
#[derive(Clone, Debug)]
pub struct AlertGate {
    cooldown: Duration,
    last: Option<Instant>,
}

impl AlertGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    /// Restart the window at `now` regardless of its state.
    pub fn restart(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        let open = match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
            None => true,
        };
        if open {
            self.last = Some(now);
        }
        open
    }
}

/// Announces the top detection of each frame through a speech sink.
pub struct Announcer<S: SpeechSink> {
    policy: AlertPolicy,
    gate: AlertGate,
    last_spoken: Option<(String, Option<Proximity>)>,
    sink: S,
}

impl<S: SpeechSink> Announcer<S> {
    pub fn new(policy: AlertPolicy, cooldown: Duration, sink: S) -> Self {
        Self {
            policy,
            gate: AlertGate::new(cooldown),
            last_spoken: None,
            sink,
        }
    }

    /// Speak about the first detection, if any.
    ///
    /// Repeats of the last announcement (same name, same band) wait for the
    /// cooldown; anything else is spoken immediately and restarts it.
    /// Returns the phrase when something was spoken.
    pub fn announce(&mut self, detections: &[Detection], now: Instant) -> Option<String> {
        let top = detections.first()?;
        let band = self.policy.proximity(top.distance);
        let changed = match &self.last_spoken {
            Some((name, last_band)) => *name != top.name || *last_band != band,
            None => true,
        };
        if !self.gate.admit(now) {
            if !changed {
                return None;
            }
            self.gate.restart(now);
        }

        let text = self.policy.phrase(top);
        log::debug!("announcing {} ({:?})", top.name, band);
        self.last_spoken = Some((top.name.clone(), band));
        self.sink.speak(&text);
        Some(text)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
