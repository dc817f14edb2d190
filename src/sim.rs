//! Scripted sensor backend.
//!
//! Stands in for the real middleware so the whole pipeline runs without
//! hardware: one user walks through detection → pose → calibration (first
//! attempt fails, second succeeds) → tracking, a session opens, the focus
//! hand waves, pushes, swipes and holds steady, the arms cross for a
//! stretch, and everything winds down. The script repeats every
//! [`CYCLE_FRAMES`] frames, so a looping daemon run replays it.

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::config::Profile;
use crate::geometry::Point3;
use crate::histogram::DepthFrame;
use crate::sensor::{
    Capability, FrameBatch, Joint, JointSample, MotionSample, SensorError, SensorSource,
    SessionEvent, TrackerControl, UserEvent,
};

/// Length of one scripted cycle, in frames.
pub const CYCLE_FRAMES: u64 = 240;

const FRAME_MS: u64 = 33;

const USER_ID: u32 = 1;
const USER_APPEARS: u64 = 5;
const FOCUS_BEGIN: u64 = 40;
const SESSION_START: u64 = 45;
const SESSION_END: u64 = 200;
const USER_LOST: u64 = 210;

// motion phases, relative to session start
const WAVE_UNTIL: u64 = 40;
const PUSH_UNTIL: u64 = 60;
const SWIPE_UNTIL: u64 = 72;
const STEADY_UNTIL: u64 = 90;

// arms crossed during this cycle window; low confidence right after
const CROSS_FROM: u64 = 120;
const CROSS_UNTIL: u64 = 135;
const LOW_CONF_FROM: u64 = 140;
const LOW_CONF_UNTIL: u64 = 145;

pub struct SimSensor {
    max_depth: u16,
    pose: String,
    /// Focus gesture reported when the first session opens, and the quick
    /// refocus gesture reported on later cycles; both from the profile's
    /// `[session]` table.
    focus_gesture: String,
    refocus_gesture: String,
    base_frame: DepthFrame,
    frame_no: u64,
    total_frames: Option<u64>,
    paced: bool,
    tracking: HashSet<u32>,
    cal_attempts: HashMap<u32, u32>,
    scheduled: Vec<(u64, UserEvent)>,
    session_active: bool,
}

impl SimSensor {
    /// Finite run of `frames` frames, unpaced; for the foreground demo and
    /// tests. One full script cycle is [`CYCLE_FRAMES`] frames.
    pub fn scripted(profile: &Profile, frames: u64) -> Self {
        Self::build(profile, Some(frames), false)
    }

    /// Endless paced run for the daemon; sleeps one frame interval per tick.
    pub fn looping(profile: &Profile) -> Self {
        Self::build(profile, None, true)
    }

    fn build(profile: &Profile, total_frames: Option<u64>, paced: bool) -> Self {
        let s = &profile.sensor;
        let mut base_frame = DepthFrame::new(s.width, s.height);
        // static backdrop: depth ramps with row; column 0 has no reading
        for y in 0..s.height {
            let d = 800 + (y * 2000 / s.height.max(1)) as u16;
            for x in 1..s.width {
                base_frame.set(x, y, d.min(s.max_depth));
            }
        }
        let session = &profile.session;
        let focus_gesture = session
            .focus_gestures
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
            .to_string();

        Self {
            max_depth: s.max_depth,
            pose: "Psi".to_string(),
            focus_gesture,
            refocus_gesture: session.refocus_gesture.clone(),
            base_frame,
            frame_no: 0,
            total_frames,
            paced,
            tracking: HashSet::new(),
            cal_attempts: HashMap::new(),
            scheduled: Vec::new(),
            session_active: false,
        }
    }

    fn cycle_pos(&self) -> u64 {
        self.frame_no % CYCLE_FRAMES
    }

    fn timestamp_ms(&self) -> u64 {
        self.frame_no * FRAME_MS
    }

    fn scripted_user_events(&self, t: u64) -> Vec<UserEvent> {
        let mut events = Vec::new();
        if t == USER_APPEARS {
            events.push(UserEvent::New { id: USER_ID });
        }
        if t == USER_LOST {
            events.push(UserEvent::Lost { id: USER_ID });
        }
        events
    }

    fn session_events(&mut self, t: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if (FOCUS_BEGIN..SESSION_START).contains(&t) {
            // first session opens on the focus gesture; repeats of the scene
            // re-enter through the quick refocus gesture
            let gesture = if self.frame_no <= CYCLE_FRAMES {
                self.focus_gesture.clone()
            } else {
                self.refocus_gesture.clone()
            };
            events.push(SessionEvent::FocusProgress {
                gesture,
                position: Point3::new(0.0, 100.0, 1500.0),
                progress: (t - FOCUS_BEGIN + 1) as f32 / (SESSION_START - FOCUS_BEGIN) as f32,
            });
        }
        if t == SESSION_START {
            self.session_active = true;
            events.push(SessionEvent::Started {
                focus: Point3::new(0.0, 100.0, 1500.0),
            });
        }
        if t == SESSION_END {
            self.session_active = false;
            events.push(SessionEvent::Ended);
        }
        events
    }

    fn motion(&self, t: u64) -> Vec<MotionSample> {
        if !self.session_active || t <= SESSION_START {
            return Vec::new();
        }
        let p = t - SESSION_START - 1;
        let ts = self.timestamp_ms();
        let sample = if p < WAVE_UNTIL {
            // hand sweeps left/right, flipping every four frames
            let dir = if (p / 4) % 2 == 0 { 1.0 } else { -1.0 };
            MotionSample {
                position: Point3::new(dir * 40.0, 120.0, 1500.0),
                velocity: Point3::new(dir * 320.0, 0.0, 0.0),
                timestamp_ms: ts,
            }
        } else if p < PUSH_UNTIL {
            MotionSample {
                position: Point3::new(0.0, 120.0, 1500.0 - (p - WAVE_UNTIL) as f32 * 14.0),
                velocity: Point3::new(10.0, 0.0, -420.0),
                timestamp_ms: ts,
            }
        } else if p < SWIPE_UNTIL {
            let step = (p - PUSH_UNTIL) as f32;
            MotionSample {
                position: Point3::new(step * 30.0, 120.0, 1400.0),
                velocity: Point3::new(900.0, 0.0, 0.0),
                timestamp_ms: ts,
            }
        } else if p < STEADY_UNTIL {
            MotionSample {
                position: Point3::new(330.0, 120.0, 1400.0),
                velocity: Point3::new(4.0, 4.0, 0.0),
                timestamp_ms: ts,
            }
        } else {
            // drift: too slow for a wave, too fast to read as steady
            MotionSample {
                position: Point3::new(330.0, 120.0, 1450.0),
                velocity: Point3::new(80.0, 0.0, 0.0),
                timestamp_ms: ts,
            }
        };
        vec![sample]
    }
}

impl SensorSource for SimSensor {
    fn supports(&self, cap: Capability) -> bool {
        matches!(cap, Capability::Skeleton | Capability::PoseDetection)
    }

    fn max_depth(&self) -> u16 {
        self.max_depth
    }

    fn calibration_pose(&self) -> Option<String> {
        Some(self.pose.clone())
    }

    fn wait_frame(&mut self) -> Result<FrameBatch, SensorError> {
        if let Some(total) = self.total_frames {
            if self.frame_no >= total {
                return Err(SensorError::StreamEnded);
            }
        }
        if self.paced {
            thread::sleep(Duration::from_millis(FRAME_MS));
        }
        self.frame_no += 1;

        let t = self.cycle_pos();
        let mut user_events = self.scripted_user_events(t);

        // deliver command responses that have come due
        let now = self.frame_no;
        let mut due: Vec<UserEvent> = Vec::new();
        self.scheduled.retain(|(frame, ev)| {
            if *frame <= now {
                due.push(ev.clone());
                false
            } else {
                true
            }
        });
        user_events.extend(due);

        let session_events = self.session_events(t);
        let motion = self.motion(t);

        Ok(FrameBatch {
            depth: self.base_frame.clone(),
            image: None,
            user_events,
            session_events,
            motion,
        })
    }

    fn joint(&self, id: u32, joint: Joint) -> Option<JointSample> {
        if !self.tracking.contains(&id) {
            return None;
        }
        let t = self.cycle_pos();
        let crossed = (CROSS_FROM..CROSS_UNTIL).contains(&t);
        let confidence = if (LOW_CONF_FROM..LOW_CONF_UNTIL).contains(&t) {
            match joint {
                Joint::LeftHand | Joint::RightHand => 0.3,
                _ => 0.9,
            }
        } else {
            0.9
        };

        let position = match joint {
            Joint::Head => Point3::new(0.0, 500.0, 1500.0),
            Joint::Neck => Point3::new(0.0, 400.0, 1500.0),
            Joint::Torso => Point3::new(0.0, 150.0, 1500.0),
            Joint::LeftShoulder => Point3::new(-180.0, 350.0, 1500.0),
            Joint::RightShoulder => Point3::new(180.0, 350.0, 1500.0),
            Joint::LeftElbow => Point3::new(-250.0, -50.0, 1500.0),
            Joint::RightElbow => Point3::new(250.0, -50.0, 1500.0),
            Joint::LeftHand => {
                if crossed {
                    Point3::new(300.0, 180.0, 1400.0)
                } else {
                    Point3::new(-350.0, 150.0, 1450.0)
                }
            }
            Joint::RightHand => {
                if crossed {
                    Point3::new(-300.0, 160.0, 1400.0)
                } else {
                    Point3::new(350.0, 150.0, 1450.0)
                }
            }
        };
        Some(JointSample {
            position,
            confidence,
        })
    }
}

impl TrackerControl for SimSensor {
    fn start_pose_detection(&mut self, id: u32, pose: &str) -> Result<(), SensorError> {
        let due = self.frame_no + 8;
        self.scheduled.push((
            due,
            UserEvent::PoseDetected {
                id,
                pose: pose.to_string(),
            },
        ));
        Ok(())
    }

    fn stop_pose_detection(&mut self, id: u32) -> Result<(), SensorError> {
        self.scheduled
            .retain(|(_, ev)| !matches!(ev, UserEvent::PoseDetected { id: p, .. } if *p == id));
        Ok(())
    }

    fn request_calibration(&mut self, id: u32) -> Result<(), SensorError> {
        let attempts = self.cal_attempts.entry(id).or_insert(0);
        *attempts += 1;
        // first attempt always fails so the retry path gets exercised
        let success = *attempts >= 2;
        let due = self.frame_no + 10;
        self.scheduled
            .push((due, UserEvent::CalibrationResult { id, success }));
        Ok(())
    }

    fn abort_calibration(&mut self, id: u32) -> Result<(), SensorError> {
        self.scheduled
            .retain(|(_, ev)| !matches!(ev, UserEvent::CalibrationResult { id: c, .. } if *c == id));
        Ok(())
    }

    fn start_tracking(&mut self, id: u32) -> Result<(), SensorError> {
        self.tracking.insert(id);
        Ok(())
    }

    fn stop_tracking(&mut self, id: u32) -> Result<(), SensorError> {
        if !self.tracking.remove(&id) {
            debug!("stop-tracking for user {id} already stopped; no-op");
        }
        self.cal_attempts.remove(&id);
        Ok(())
    }
}
