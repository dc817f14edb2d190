//! Boundary with the external depth sensor / skeletal tracker middleware.
//!
//! The sensor SDK does the hard work (depth sensing, pose estimation, focus
//! gesture classification); this module pins down what the orchestration
//! core consumes from it and what it commands back. Backends implement
//! [`SensorSource`] and [`TrackerControl`]; the crate ships a scripted
//! simulation backend in [`crate::sim`].

use thiserror::Error;

use crate::geometry::Point3;
use crate::histogram::DepthFrame;

/// Joint samples below this confidence are treated as absent for any
/// downstream geometry.
pub const MIN_JOINT_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Error)]
pub enum SensorError {
    /// Fatal at startup: the deployment cannot work without it.
    #[error("sensor does not support required capability: {0}")]
    UnsupportedCapability(&'static str),

    /// The source has no more frames to deliver (end of a scripted run or
    /// recording).
    #[error("sensor stream ended")]
    StreamEnded,

    /// The tracker refused a command. Transient; the lifecycle controller
    /// logs and carries on.
    #[error("tracker rejected command for user {id}: {reason}")]
    CommandRejected { id: u32, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Skeleton,
    PoseDetection,
}

/// The joints the core asks about. Only the arm joints drive logic today;
/// the rest exist so a renderer can request a full upper-body skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    Head,
    Neck,
    Torso,
    LeftShoulder,
    LeftElbow,
    LeftHand,
    RightShoulder,
    RightElbow,
    RightHand,
}

#[derive(Debug, Clone, Copy)]
pub struct JointSample {
    pub position: Point3,
    pub confidence: f32,
}

impl JointSample {
    pub fn is_usable(&self) -> bool {
        self.confidence >= MIN_JOINT_CONFIDENCE
    }
}

/// Asynchronous per-user notifications from the tracker. Delivery is
/// exactly-once-intended but may in practice be duplicated or reordered
/// relative to `Lost` for the same id; consumers must tolerate both.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    New { id: u32 },
    Lost { id: u32 },
    PoseDetected { id: u32, pose: String },
    PoseLost { id: u32, pose: String },
    CalibrationResult { id: u32, success: bool },
}

/// Session-level signals from the middleware's focus detector.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    FocusProgress {
        gesture: String,
        position: Point3,
        progress: f32,
    },
    Started {
        focus: Point3,
    },
    Ended,
}

/// One motion update for the focus hand, delivered only while a session is
/// active. Positions in millimeters, velocities in mm/s.
#[derive(Debug, Clone, Copy)]
pub struct MotionSample {
    pub position: Point3,
    pub velocity: Point3,
    pub timestamp_ms: u64,
}

/// RGB camera frame matching the depth resolution, when the backend has one.
#[derive(Debug, Clone)]
pub struct ImageFrame {
    pub width: usize,
    pub height: usize,
    pub rgb: Vec<u8>,
}

/// Everything the source delivers for one acquisition tick.
#[derive(Debug)]
pub struct FrameBatch {
    pub depth: DepthFrame,
    pub image: Option<ImageFrame>,
    pub user_events: Vec<UserEvent>,
    pub session_events: Vec<SessionEvent>,
    pub motion: Vec<MotionSample>,
}

/// Blocking frame/event acquisition. `wait_frame` is the only call in the
/// core allowed to block.
pub trait SensorSource {
    fn supports(&self, cap: Capability) -> bool;

    fn max_depth(&self) -> u16;

    /// The pose users must strike before calibration, or `None` when the
    /// backend calibrates without one.
    fn calibration_pose(&self) -> Option<String>;

    /// Suspend until the next frame and event batch is available.
    fn wait_frame(&mut self) -> Result<FrameBatch, SensorError>;

    /// Joint sample for a user. Only meaningful while that user is in the
    /// tracking state; backends return `None` otherwise.
    fn joint(&self, id: u32, joint: Joint) -> Option<JointSample>;
}

/// Commands the lifecycle controller issues back to the tracker.
pub trait TrackerControl {
    fn start_pose_detection(&mut self, id: u32, pose: &str) -> Result<(), SensorError>;
    fn stop_pose_detection(&mut self, id: u32) -> Result<(), SensorError>;
    fn request_calibration(&mut self, id: u32) -> Result<(), SensorError>;
    fn abort_calibration(&mut self, id: u32) -> Result<(), SensorError>;
    fn start_tracking(&mut self, id: u32) -> Result<(), SensorError>;
    /// Must be idempotent: the tracker may re-deliver a loss event and the
    /// resulting second stop is a no-op, not an error.
    fn stop_tracking(&mut self, id: u32) -> Result<(), SensorError>;
}

/// Startup capability check. Unsupported capabilities are configuration
/// errors: fatal once, never retried at runtime.
pub fn validate_capabilities(source: &dyn SensorSource) -> Result<(), SensorError> {
    if !source.supports(Capability::Skeleton) {
        return Err(SensorError::UnsupportedCapability("skeleton tracking"));
    }
    if source.calibration_pose().is_some() && !source.supports(Capability::PoseDetection) {
        return Err(SensorError::UnsupportedCapability("pose detection"));
    }
    Ok(())
}
