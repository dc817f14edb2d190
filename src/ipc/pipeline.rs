//! Frame-driven orchestration loop.
//!
//! One tick per sensor frame: refresh the depth display LUT, feed user
//! events into the lifecycle controller, extend hand trails and check for
//! crossed arms, feed session events and motion into the gesture
//! dispatcher, apply bindings, and publish a status snapshot.

use anyhow::Result;
use log::{debug, error, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::dispatch::dispatch_gesture;
use crate::config::Profile;
use crate::detectors::{PushDetector, SteadyDetector, SwipeDetector, WaveDetector};
use crate::geometry::{Point2, crossing_point};
use crate::histogram::HistogramLut;
use crate::lifecycle::LifecycleController;
use crate::sensor::{
    FrameBatch, Joint, SensorError, SensorSource, TrackerControl, UserEvent, validate_capabilities,
};
use crate::session::SessionDispatcher;
use crate::sim::SimSensor;
use crate::snapshot::{FocusStatus, SharedSnapshot, StatusSnapshot, UserStatus};
use crate::trail::Trail;

struct HandTrails {
    left: Trail,
    right: Trail,
    /// Arms were crossed on the previous frame; crossings count episodes,
    /// not frames.
    crossed: bool,
}

impl HandTrails {
    fn new(capacity: usize) -> Self {
        Self {
            left: Trail::new(capacity),
            right: Trail::new(capacity),
            crossed: false,
        }
    }
}

pub struct Pipeline {
    controller: LifecycleController,
    dispatcher: SessionDispatcher,
    trails: HashMap<u32, HandTrails>,
    trail_capacity: usize,
    lut: HistogramLut,
    frames: u64,
    counts: BTreeMap<String, u64>,
    last_crossing: Option<Point2>,
    crossings: u64,
}

impl Pipeline {
    /// Thresholds are captured here; bindings are re-read on every fired
    /// gesture, so a profile reload changes actions without a restart.
    pub fn new(source: &dyn SensorSource, profile: &Profile) -> Result<Self, SensorError> {
        validate_capabilities(source)?;

        let controller = LifecycleController::new(
            source.calibration_pose(),
            profile.sensor.calibration_retry_limit,
        );

        let th = &profile.thresholds;
        let mut dispatcher = SessionDispatcher::new();
        dispatcher.add_listener(Box::new(WaveDetector::new(th.clone())));
        dispatcher.add_listener(Box::new(PushDetector::new(th.clone())));
        dispatcher.add_listener(Box::new(SwipeDetector::new(th.clone())));
        dispatcher.add_listener(Box::new(SteadyDetector::new(th.clone())));

        Ok(Self {
            controller,
            dispatcher,
            trails: HashMap::new(),
            trail_capacity: profile.sensor.trail_capacity,
            lut: HistogramLut::default(),
            frames: 0,
            counts: BTreeMap::new(),
            last_crossing: None,
            crossings: 0,
        })
    }

    /// Display LUT computed from the most recent depth frame.
    pub fn lut(&self) -> &HistogramLut {
        &self.lut
    }

    pub fn tick<S: SensorSource + TrackerControl>(
        &mut self,
        sensor: &mut S,
        profile_arc: &Arc<Mutex<Profile>>,
        shared: &SharedSnapshot,
    ) -> Result<(), SensorError> {
        let batch = sensor.wait_frame()?;
        self.frames += 1;
        self.lut = HistogramLut::compute(&batch.depth, sensor.max_depth());

        self.handle_user_events(&batch, sensor);
        self.update_trails(sensor);

        for event in &batch.session_events {
            self.dispatcher.handle(event);
        }
        for sample in &batch.motion {
            for (name, event) in self.dispatcher.update(sample) {
                debug!("listener '{name}' fired {}", event.key());
                *self.counts.entry(event.key().to_string()).or_insert(0) += 1;
                if let Err(e) = dispatch_gesture(&event, profile_arc) {
                    error!("dispatch failed: {e}");
                }
            }
        }

        shared.publish(self.snapshot());
        Ok(())
    }

    fn handle_user_events<S: TrackerControl>(&mut self, batch: &FrameBatch, sensor: &mut S) {
        for event in &batch.user_events {
            if let UserEvent::Lost { id } = event {
                self.trails.remove(id);
            }
            self.controller.handle(event, sensor);
        }
    }

    fn update_trails<S: SensorSource>(&mut self, sensor: &mut S) {
        for id in self.controller.tracking_ids() {
            let le = sensor.joint(id, Joint::LeftElbow);
            let lh = sensor.joint(id, Joint::LeftHand);
            let re = sensor.joint(id, Joint::RightElbow);
            let rh = sensor.joint(id, Joint::RightHand);

            let trails = self
                .trails
                .entry(id)
                .or_insert_with(|| HandTrails::new(self.trail_capacity));

            if let Some(s) = lh.filter(|s| s.is_usable()) {
                trails.left.push(s.position);
            }
            if let Some(s) = rh.filter(|s| s.is_usable()) {
                trails.right.push(s.position);
            }

            // crossed forearms need all four arm joints at usable confidence
            let usable: Vec<_> = [le, lh, re, rh]
                .into_iter()
                .filter_map(|j| j.filter(|s| s.is_usable()))
                .collect();
            if usable.len() < 4 {
                trails.crossed = false;
                continue;
            }

            let hit = crossing_point(
                usable[0].position.xy(),
                usable[1].position.xy(),
                usable[2].position.xy(),
                usable[3].position.xy(),
            );
            match hit {
                Some(p) => {
                    if !trails.crossed {
                        info!("user {id} crossed arms at ({:.0}, {:.0})", p.x, p.y);
                        self.crossings += 1;
                    }
                    trails.crossed = true;
                    self.last_crossing = Some(p);
                }
                None => trails.crossed = false,
            }
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        let users = self
            .controller
            .tracks()
            .into_iter()
            .map(|track| {
                let (left, right) = self
                    .trails
                    .get(&track.id)
                    .map(|t| (t.left.len(), t.right.len()))
                    .unwrap_or((0, 0));
                UserStatus {
                    id: track.id,
                    state: track.state.label(),
                    color_index: track.color_index,
                    status: track.status_line(),
                    left_trail_len: left,
                    right_trail_len: right,
                }
            })
            .collect();

        StatusSnapshot {
            frames: self.frames,
            session: self.dispatcher.state(),
            focus: self
                .dispatcher
                .focus_progress()
                .map(|(gesture, progress)| FocusStatus {
                    gesture: gesture.to_string(),
                    progress,
                }),
            users,
            gesture_counts: self.counts.clone(),
            last_crossing: self.last_crossing,
            crossings: self.crossings,
        }
    }
}

/// Daemon pipeline: endless paced simulation, stopped cooperatively.
pub fn run_pipeline(
    profile: Arc<Mutex<Profile>>,
    shared: SharedSnapshot,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let initial = { profile.lock().unwrap().clone() };
    let mut sensor = SimSensor::looping(&initial);
    let mut pipeline = Pipeline::new(&sensor, &initial)?;

    while !stop.load(Ordering::Relaxed) {
        match pipeline.tick(&mut sensor, &profile, &shared) {
            Ok(()) => {}
            Err(SensorError::StreamEnded) => {
                info!("sensor stream ended; pipeline stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Foreground run over a finite scripted stream; returns the final snapshot.
pub fn run_scripted(profile: &Profile, frames: u64) -> Result<StatusSnapshot> {
    let mut sensor = SimSensor::scripted(profile, frames);
    let profile_arc = Arc::new(Mutex::new(profile.clone()));
    let shared = SharedSnapshot::new();
    let mut pipeline = Pipeline::new(&sensor, profile)?;

    loop {
        match pipeline.tick(&mut sensor, &profile_arc, &shared) {
            Ok(()) => {}
            Err(SensorError::StreamEnded) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(shared.read())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_profile;
    use crate::sim::CYCLE_FRAMES;

    #[test]
    fn scripted_cycle_fires_gestures_and_crossing() {
        let profile = builtin_profile();
        let snap = run_scripted(&profile, CYCLE_FRAMES).expect("pipeline run");

        assert_eq!(snap.frames, CYCLE_FRAMES);
        assert!(*snap.gesture_counts.get("wave").unwrap_or(&0) >= 1);
        assert!(*snap.gesture_counts.get("push").unwrap_or(&0) >= 1);
        assert_eq!(snap.crossings, 1);
        assert!(snap.last_crossing.is_some());
    }

    #[test]
    fn short_run_sees_no_session() {
        let profile = builtin_profile();
        // the script opens its session only after frame 45
        let snap = run_scripted(&profile, 20).expect("pipeline run");
        assert!(snap.gesture_counts.is_empty());
        assert_eq!(snap.crossings, 0);
    }
}
