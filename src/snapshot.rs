//! Owned state snapshot shared by copy between the pipeline thread and
//! readers (IPC status, a host UI thread). The pipeline replaces the whole
//! value under a short critical section; readers clone it out. Nothing
//! holds a reference across the lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::geometry::Point2;
use crate::session::SessionState;

#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub id: u32,
    pub state: &'static str,
    pub color_index: usize,
    pub status: String,
    pub left_trail_len: usize,
    pub right_trail_len: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusStatus {
    pub gesture: String,
    pub progress: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub frames: u64,
    pub session: SessionState,
    pub focus: Option<FocusStatus>,
    pub users: Vec<UserStatus>,
    pub gesture_counts: BTreeMap<String, u64>,
    /// Most recent arms-crossed intersection, in x/y millimeters.
    pub last_crossing: Option<Point2>,
    pub crossings: u64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            frames: 0,
            session: SessionState::NotInSession,
            focus: None,
            users: Vec::new(),
            gesture_counts: BTreeMap::new(),
            last_crossing: None,
            crossings: 0,
        }
    }
}

/// Handle shared between the pipeline thread and readers.
#[derive(Debug, Clone, Default)]
pub struct SharedSnapshot {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        *self.inner.lock().unwrap() = snapshot;
    }

    pub fn read(&self) -> StatusSnapshot {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_owned_copy() {
        let shared = SharedSnapshot::new();
        let mut snap = StatusSnapshot::default();
        snap.frames = 42;
        shared.publish(snap);

        let mut copy = shared.read();
        copy.frames = 0;
        // mutation of the copy does not leak back
        assert_eq!(shared.read().frames, 42);
    }
}
