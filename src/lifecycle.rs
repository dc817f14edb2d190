//! Per-user calibration/tracking lifecycle state machine.
//!
//! Consumes asynchronous [`UserEvent`]s from the tracker and issues
//! pose-detection/calibration/tracking commands back through
//! [`TrackerControl`]. Events may arrive duplicated or reordered relative to
//! a loss; anything referencing an id with no live track is stale and gets
//! ignored, not treated as an error.

use std::collections::HashMap;

use log::{debug, error, info, warn};

use crate::sensor::{SensorError, TrackerControl, UserEvent};

// matches the renderer's user color table; index 0 is "no user"
const COLOR_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Waiting for the user to strike the calibration pose.
    AwaitingPose,
    /// Calibration requested, waiting for the result.
    Calibrating,
    /// Calibrated; the tracker is emitting joint samples.
    Tracking,
}

impl TrackState {
    pub fn label(&self) -> &'static str {
        match self {
            TrackState::AwaitingPose => "awaiting-pose",
            TrackState::Calibrating => "calibrating",
            TrackState::Tracking => "tracking",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserTrack {
    pub id: u32,
    pub state: TrackState,
    /// The pose that led into calibration, when one was required.
    pub pose: Option<String>,
    /// Stable small index for renderer color tables, 1-based.
    pub color_index: usize,
    retries: u32,
}

impl UserTrack {
    pub fn status_line(&self) -> String {
        match self.state {
            TrackState::AwaitingPose => format!("user {}: waiting for calibration pose", self.id),
            TrackState::Calibrating => format!("user {}: calibrating", self.id),
            TrackState::Tracking => format!("user {}: tracking", self.id),
        }
    }
}

pub struct LifecycleController {
    users: HashMap<u32, UserTrack>,
    /// Pose required before calibration; `None` means calibrate directly.
    pose: Option<String>,
    retry_limit: u32,
    next_color: usize,
}

impl LifecycleController {
    pub fn new(pose: Option<String>, retry_limit: u32) -> Self {
        Self {
            users: HashMap::new(),
            pose,
            retry_limit,
            next_color: 0,
        }
    }

    pub fn get(&self, id: u32) -> Option<&UserTrack> {
        self.users.get(&id)
    }

    pub fn is_tracking(&self, id: u32) -> bool {
        self.users
            .get(&id)
            .map(|u| u.state == TrackState::Tracking)
            .unwrap_or(false)
    }

    /// Ids currently in the tracking state, ascending.
    pub fn tracking_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .users
            .values()
            .filter(|u| u.state == TrackState::Tracking)
            .map(|u| u.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// All live tracks, ascending by id.
    pub fn tracks(&self) -> Vec<&UserTrack> {
        let mut tracks: Vec<&UserTrack> = self.users.values().collect();
        tracks.sort_unstable_by_key(|u| u.id);
        tracks
    }

    pub fn handle(&mut self, event: &UserEvent, tracker: &mut dyn TrackerControl) {
        match event {
            UserEvent::New { id } => self.on_new(*id, tracker),
            UserEvent::Lost { id } => self.on_lost(*id, tracker),
            UserEvent::PoseDetected { id, pose } => self.on_pose_detected(*id, pose, tracker),
            UserEvent::PoseLost { id, pose } => self.on_pose_lost(*id, pose),
            UserEvent::CalibrationResult { id, success } => {
                self.on_calibration(*id, *success, tracker)
            }
        }
    }

    fn on_new(&mut self, id: u32, tracker: &mut dyn TrackerControl) {
        if self.users.contains_key(&id) {
            warn!("duplicate new-user event for {id}; ignoring");
            return;
        }

        self.next_color = self.next_color % COLOR_COUNT + 1;
        let state = if let Some(pose) = &self.pose {
            info!("user {id} detected; starting pose detection for '{pose}'");
            issue(tracker.start_pose_detection(id, pose), "start pose detection");
            TrackState::AwaitingPose
        } else {
            info!("user {id} detected; requesting calibration");
            issue(tracker.request_calibration(id), "request calibration");
            TrackState::Calibrating
        };

        self.users.insert(
            id,
            UserTrack {
                id,
                state,
                pose: None,
                color_index: self.next_color,
                retries: 0,
            },
        );
    }

    fn on_lost(&mut self, id: u32, tracker: &mut dyn TrackerControl) {
        let Some(track) = self.users.remove(&id) else {
            debug!("loss event for unknown user {id}; ignoring");
            return;
        };

        info!("user {id} lost in state {}", track.state.label());
        match track.state {
            TrackState::AwaitingPose => {
                issue(tracker.stop_pose_detection(id), "stop pose detection");
            }
            TrackState::Calibrating => {
                issue(tracker.abort_calibration(id), "abort calibration");
            }
            TrackState::Tracking => {
                issue(tracker.stop_tracking(id), "stop tracking");
            }
        }
    }

    fn on_pose_detected(&mut self, id: u32, pose: &str, tracker: &mut dyn TrackerControl) {
        let Some(track) = self.users.get_mut(&id) else {
            debug!("pose-detected event for unknown user {id}; ignoring");
            return;
        };
        if track.state != TrackState::AwaitingPose {
            debug!(
                "pose '{pose}' for user {id} in state {}; ignoring",
                track.state.label()
            );
            return;
        }

        info!("user {id} struck pose '{pose}'; requesting calibration");
        track.state = TrackState::Calibrating;
        track.pose = Some(pose.to_string());
        issue(tracker.stop_pose_detection(id), "stop pose detection");
        issue(tracker.request_calibration(id), "request calibration");
    }

    fn on_pose_lost(&mut self, id: u32, pose: &str) {
        // informational; re-detection is expected
        match self.users.get(&id) {
            Some(track) if track.state == TrackState::AwaitingPose => {
                debug!("user {id} dropped out of pose '{pose}'");
            }
            _ => debug!("stale pose-lost event for user {id}; ignoring"),
        }
    }

    // A failure retries calibration in place; pose re-detection is the
    // fallback once the retry budget is spent, not the first response to
    // every failed attempt.
    fn on_calibration(&mut self, id: u32, success: bool, tracker: &mut dyn TrackerControl) {
        let Some(track) = self.users.get_mut(&id) else {
            debug!("calibration result for unknown user {id}; ignoring");
            return;
        };
        if track.state != TrackState::Calibrating {
            debug!(
                "calibration result for user {id} in state {}; ignoring",
                track.state.label()
            );
            return;
        }

        if success {
            info!("user {id} calibrated; starting tracking");
            track.state = TrackState::Tracking;
            track.retries = 0;
            issue(tracker.start_tracking(id), "start tracking");
            return;
        }

        track.retries += 1;
        if track.retries > self.retry_limit && self.pose.is_some() {
            // retries exhausted: back to pose detection rather than looping
            // tight on calibration
            warn!(
                "user {id} calibration failed {} times; re-detecting pose",
                track.retries
            );
            track.state = TrackState::AwaitingPose;
            track.pose = None;
            track.retries = 0;
            let pose = self.pose.as_deref().unwrap_or_default().to_string();
            issue(tracker.start_pose_detection(id, &pose), "start pose detection");
        } else {
            if track.retries > self.retry_limit {
                warn!(
                    "user {id} calibration failed {} times (no pose fallback); retrying",
                    track.retries
                );
            } else {
                info!("user {id} calibration failed; retrying");
            }
            issue(tracker.request_calibration(id), "request calibration");
        }
    }
}

// Command failures are transient per-user errors: recover locally, never
// surface to the application.
fn issue(result: Result<(), SensorError>, what: &str) {
    if let Err(e) = result {
        error!("tracker command '{what}' failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SensorError, TrackerControl};

    #[derive(Debug, Default)]
    struct RecordingTracker {
        commands: Vec<String>,
    }

    impl RecordingTracker {
        fn count(&self, prefix: &str) -> usize {
            self.commands.iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl TrackerControl for RecordingTracker {
        fn start_pose_detection(&mut self, id: u32, pose: &str) -> Result<(), SensorError> {
            self.commands.push(format!("start_pose:{id}:{pose}"));
            Ok(())
        }
        fn stop_pose_detection(&mut self, id: u32) -> Result<(), SensorError> {
            self.commands.push(format!("stop_pose:{id}"));
            Ok(())
        }
        fn request_calibration(&mut self, id: u32) -> Result<(), SensorError> {
            self.commands.push(format!("calibrate:{id}"));
            Ok(())
        }
        fn abort_calibration(&mut self, id: u32) -> Result<(), SensorError> {
            self.commands.push(format!("abort_cal:{id}"));
            Ok(())
        }
        fn start_tracking(&mut self, id: u32) -> Result<(), SensorError> {
            self.commands.push(format!("start_track:{id}"));
            Ok(())
        }
        fn stop_tracking(&mut self, id: u32) -> Result<(), SensorError> {
            self.commands.push(format!("stop_track:{id}"));
            Ok(())
        }
    }

    fn pose_controller() -> LifecycleController {
        LifecycleController::new(Some("Psi".to_string()), 3)
    }

    #[test]
    fn happy_path_ends_in_tracking() {
        let mut ctl = pose_controller();
        let mut trk = RecordingTracker::default();

        ctl.handle(&UserEvent::New { id: 1 }, &mut trk);
        assert_eq!(ctl.get(1).unwrap().state, TrackState::AwaitingPose);

        ctl.handle(
            &UserEvent::PoseDetected {
                id: 1,
                pose: "Psi".to_string(),
            },
            &mut trk,
        );
        assert_eq!(ctl.get(1).unwrap().state, TrackState::Calibrating);

        ctl.handle(
            &UserEvent::CalibrationResult {
                id: 1,
                success: true,
            },
            &mut trk,
        );
        assert!(ctl.is_tracking(1));
        assert_eq!(trk.count("start_track:1"), 1);
        assert_eq!(ctl.tracking_ids(), vec![1]);
    }

    #[test]
    fn no_pose_required_calibrates_directly() {
        let mut ctl = LifecycleController::new(None, 3);
        let mut trk = RecordingTracker::default();

        ctl.handle(&UserEvent::New { id: 7 }, &mut trk);
        assert_eq!(ctl.get(7).unwrap().state, TrackState::Calibrating);
        assert_eq!(trk.count("start_pose:"), 0);
        assert_eq!(trk.count("calibrate:7"), 1);
    }

    #[test]
    fn duplicate_lost_stops_tracking_once() {
        let mut ctl = pose_controller();
        let mut trk = RecordingTracker::default();

        ctl.handle(&UserEvent::New { id: 1 }, &mut trk);
        ctl.handle(
            &UserEvent::PoseDetected {
                id: 1,
                pose: "Psi".to_string(),
            },
            &mut trk,
        );
        ctl.handle(
            &UserEvent::CalibrationResult {
                id: 1,
                success: true,
            },
            &mut trk,
        );

        ctl.handle(&UserEvent::Lost { id: 1 }, &mut trk);
        ctl.handle(&UserEvent::Lost { id: 1 }, &mut trk);
        assert_eq!(trk.count("stop_track:1"), 1);
        assert!(ctl.get(1).is_none());
    }

    #[test]
    fn stale_events_after_loss_are_ignored() {
        let mut ctl = pose_controller();
        let mut trk = RecordingTracker::default();

        ctl.handle(&UserEvent::New { id: 2 }, &mut trk);
        ctl.handle(&UserEvent::Lost { id: 2 }, &mut trk);
        let before = trk.commands.len();

        ctl.handle(
            &UserEvent::PoseDetected {
                id: 2,
                pose: "Psi".to_string(),
            },
            &mut trk,
        );
        ctl.handle(
            &UserEvent::CalibrationResult {
                id: 2,
                success: true,
            },
            &mut trk,
        );
        assert_eq!(trk.commands.len(), before);
    }

    #[test]
    fn calibration_failure_retries_then_falls_back_to_pose() {
        let mut ctl = LifecycleController::new(Some("Psi".to_string()), 2);
        let mut trk = RecordingTracker::default();

        ctl.handle(&UserEvent::New { id: 3 }, &mut trk);
        ctl.handle(
            &UserEvent::PoseDetected {
                id: 3,
                pose: "Psi".to_string(),
            },
            &mut trk,
        );

        for _ in 0..2 {
            ctl.handle(
                &UserEvent::CalibrationResult {
                    id: 3,
                    success: false,
                },
                &mut trk,
            );
            assert_eq!(ctl.get(3).unwrap().state, TrackState::Calibrating);
        }

        // third failure exceeds the limit: back to pose detection
        ctl.handle(
            &UserEvent::CalibrationResult {
                id: 3,
                success: false,
            },
            &mut trk,
        );
        assert_eq!(ctl.get(3).unwrap().state, TrackState::AwaitingPose);
        assert_eq!(trk.count("start_pose:3"), 2);
    }

    #[test]
    fn pose_lost_keeps_awaiting_pose() {
        let mut ctl = pose_controller();
        let mut trk = RecordingTracker::default();

        ctl.handle(&UserEvent::New { id: 4 }, &mut trk);
        ctl.handle(
            &UserEvent::PoseLost {
                id: 4,
                pose: "Psi".to_string(),
            },
            &mut trk,
        );
        assert_eq!(ctl.get(4).unwrap().state, TrackState::AwaitingPose);
    }

    #[test]
    fn lost_while_awaiting_pose_stops_pose_detection() {
        let mut ctl = pose_controller();
        let mut trk = RecordingTracker::default();

        ctl.handle(&UserEvent::New { id: 5 }, &mut trk);
        ctl.handle(&UserEvent::Lost { id: 5 }, &mut trk);
        assert_eq!(trk.count("stop_pose:5"), 1);
        assert_eq!(trk.count("stop_track:"), 0);
    }

    #[test]
    fn color_indices_are_stable_and_small() {
        let mut ctl = LifecycleController::new(None, 1);
        let mut trk = RecordingTracker::default();
        for id in 1..=12 {
            ctl.handle(&UserEvent::New { id }, &mut trk);
        }
        for track in ctl.tracks() {
            assert!((1..=10).contains(&track.color_index));
        }
    }
}
