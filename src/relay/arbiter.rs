use std::time::Duration;
use tokio::time::Instant;

/// Barge-in arbitration state for one session.
///
/// Caller speech-activity events are debounced through a confirmation
/// window: activity must persist for `min_speech` before it counts as an
/// interruption, confirmed either by the window deadline elapsing or by a
/// stop event that arrives late enough. Transients shorter than the window
/// are discarded as noise. After a confirmed interruption a cooldown
/// suppresses re-triggering from jittery activity signals.
///
/// The machine owns no timer; the session loop polls `deadline()` and calls
/// `on_deadline` when it elapses. A cleared deadline is therefore never
/// observable, which is what makes cancellation race-free.
pub struct InterruptionArbiter {
    min_speech: Duration,
    cooldown: Duration,
    state: State,
    /// At-most-once gate for the current response
    handled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    SpeechPending { since: Instant },
    Cooldown { until: Instant },
}

impl InterruptionArbiter {
    pub fn new(min_speech: Duration, cooldown: Duration) -> Self {
        Self {
            min_speech,
            cooldown,
            state: State::Idle,
            handled: false,
        }
    }

    /// Deadline of the armed confirmation window, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::SpeechPending { since } if !self.handled => Some(since + self.min_speech),
            _ => None,
        }
    }

    /// Caller speech detected. Arms the confirmation window unless one is
    /// already pending or the cooldown is still in force. Arming clears the
    /// per-response gate: fresh speech is a fresh interruption candidate.
    pub fn on_speech_started(&mut self, now: Instant) {
        match self.state {
            State::SpeechPending { .. } => {}
            State::Cooldown { until } if now < until => {}
            _ => {
                self.state = State::SpeechPending { since: now };
                self.handled = false;
            }
        }
    }

    /// Caller speech ended. Returns `true` when the activity lasted the
    /// full confirmation window and the interruption action should run;
    /// shorter activity is noise and resets to idle.
    pub fn on_speech_stopped(&mut self, now: Instant) -> bool {
        if let State::SpeechPending { since } = self.state {
            if now.duration_since(since) >= self.min_speech && !self.handled {
                self.confirm(now);
                return true;
            }
            self.state = State::Idle;
        }
        false
    }

    /// The confirmation window elapsed with speech still active.
    pub fn on_deadline(&mut self, now: Instant) -> bool {
        if matches!(self.state, State::SpeechPending { .. }) && !self.handled {
            self.confirm(now);
            return true;
        }
        false
    }

    /// A new response began: allow one fresh interruption for it and cancel
    /// any window armed against the previous one.
    pub fn on_response_started(&mut self) {
        self.handled = false;
        if matches!(self.state, State::SpeechPending { .. }) {
            self.state = State::Idle;
        }
    }

    fn confirm(&mut self, now: Instant) {
        self.handled = true;
        self.state = State::Cooldown {
            until: now + self.cooldown,
        };
    }
}
