//! Session focus state machine and ordered gesture-listener multicast.
//!
//! A session is the bounded period, demarcated by focus/start/end signals,
//! during which motion samples mean anything. While a session is active
//! every sample is broadcast synchronously, in registration order, to each
//! registered listener; listeners are independent and one firing never
//! short-circuits the rest.

use log::info;
use serde::Serialize;

use crate::sensor::{MotionSample, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    NotInSession,
    DetectingFocus,
    InSession,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::NotInSession => "not-in-session",
            SessionState::DetectingFocus => "detecting-focus",
            SessionState::InSession => "in-session",
        }
    }
}

/// Typed events raised by the concrete detectors.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureEvent {
    Wave,
    Push { velocity: f32 },
    SwipeUp,
    SwipeDown,
    SwipeLeft,
    SwipeRight,
    Steady,
}

impl GestureEvent {
    /// Stable key used for binding lookup and counters.
    pub fn key(&self) -> &'static str {
        match self {
            GestureEvent::Wave => "wave",
            GestureEvent::Push { .. } => "push",
            GestureEvent::SwipeUp => "swipe_up",
            GestureEvent::SwipeDown => "swipe_down",
            GestureEvent::SwipeLeft => "swipe_left",
            GestureEvent::SwipeRight => "swipe_right",
            GestureEvent::Steady => "steady",
        }
    }
}

/// A single-purpose motion observer with private detection state.
pub trait GestureListener {
    fn name(&self) -> &'static str;

    /// Called for every motion sample while a session is active. Returns the
    /// listener's typed event when its internal criterion fires.
    fn on_motion(&mut self, sample: &MotionSample) -> Option<GestureEvent>;

    /// Called when the session ends so stale detection state does not leak
    /// into the next session.
    fn reset(&mut self);
}

pub struct SessionDispatcher {
    state: SessionState,
    listeners: Vec<Box<dyn GestureListener + Send>>,
    /// Focus gesture name and progress while DetectingFocus.
    focus: Option<(String, f32)>,
}

impl Default for SessionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionDispatcher {
    pub fn new() -> Self {
        Self {
            state: SessionState::NotInSession,
            listeners: Vec::new(),
            focus: None,
        }
    }

    /// Registration is append-only; order is the dispatch order.
    pub fn add_listener(&mut self, listener: Box<dyn GestureListener + Send>) {
        self.listeners.push(listener);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn focus_progress(&self) -> Option<(&str, f32)> {
        self.focus.as_ref().map(|(g, p)| (g.as_str(), *p))
    }

    pub fn handle(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::FocusProgress {
                gesture, progress, ..
            } => {
                if self.state == SessionState::InSession {
                    return;
                }
                if self.state == SessionState::NotInSession {
                    info!("focus gesture '{gesture}' detected; entering focus detection");
                    self.state = SessionState::DetectingFocus;
                }
                self.focus = Some((gesture.clone(), *progress));
            }
            SessionEvent::Started { focus } => {
                info!(
                    "session started at ({:.0}, {:.0}, {:.0})",
                    focus.x, focus.y, focus.z
                );
                self.state = SessionState::InSession;
                self.focus = None;
                for listener in &mut self.listeners {
                    listener.reset();
                }
            }
            SessionEvent::Ended => {
                info!("session ended");
                self.state = SessionState::NotInSession;
                self.focus = None;
                for listener in &mut self.listeners {
                    listener.reset();
                }
            }
        }
    }

    /// Broadcast one motion sample. Outside a session nothing reaches any
    /// listener. Fired events come back in registration order.
    pub fn update(&mut self, sample: &MotionSample) -> Vec<(&'static str, GestureEvent)> {
        if self.state != SessionState::InSession {
            return Vec::new();
        }
        let mut fired = Vec::new();
        for listener in &mut self.listeners {
            if let Some(event) = listener.on_motion(sample) {
                fired.push((listener.name(), event));
            }
        }
        fired
    }
}
