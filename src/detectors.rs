//! Concrete gesture listeners: wave, push, swipe, steady.
//!
//! Each detector owns its private state and watches the same motion stream;
//! the session dispatcher never looks inside. Units follow the sensor
//! boundary: millimeters, mm/s, milliseconds. The z axis grows away from
//! the sensor, so a push shows up as strongly negative vz; y grows upward.

use crate::config::Thresholds;
use crate::geometry::Point3;
use crate::sensor::MotionSample;
use crate::session::{GestureEvent, GestureListener};

/// Repeated left/right direction flips above a speed floor within a window.
pub struct WaveDetector {
    th: Thresholds,
    last_dir: i8,
    flips: u32,
    window_start_ms: u64,
    cooldown_until: u64,
}

impl WaveDetector {
    pub fn new(th: Thresholds) -> Self {
        Self {
            th,
            last_dir: 0,
            flips: 0,
            window_start_ms: 0,
            cooldown_until: 0,
        }
    }
}

impl GestureListener for WaveDetector {
    fn name(&self) -> &'static str {
        "wave"
    }

    fn on_motion(&mut self, sample: &MotionSample) -> Option<GestureEvent> {
        let now = sample.timestamp_ms;
        if now < self.cooldown_until {
            return None;
        }
        let vx = sample.velocity.x;
        if vx.abs() < self.th.wave_min_speed {
            return None;
        }

        let dir: i8 = if vx > 0.0 { 1 } else { -1 };
        if self.last_dir == 0 {
            self.last_dir = dir;
            self.window_start_ms = now;
            return None;
        }
        if dir == self.last_dir {
            return None;
        }

        self.last_dir = dir;
        if now.saturating_sub(self.window_start_ms) > self.th.wave_window_ms {
            // stale window; this flip starts a new one
            self.flips = 1;
            self.window_start_ms = now;
            return None;
        }

        self.flips += 1;
        if self.flips >= self.th.wave_flips {
            self.flips = 0;
            self.last_dir = 0;
            self.cooldown_until = now + self.th.cooldown_ms;
            return Some(GestureEvent::Wave);
        }
        None
    }

    fn reset(&mut self) {
        self.last_dir = 0;
        self.flips = 0;
        self.window_start_ms = 0;
        self.cooldown_until = 0;
    }
}

/// Fast motion toward the sensor, dominantly along z.
pub struct PushDetector {
    th: Thresholds,
    cooldown_until: u64,
}

impl PushDetector {
    pub fn new(th: Thresholds) -> Self {
        Self {
            th,
            cooldown_until: 0,
        }
    }
}

impl GestureListener for PushDetector {
    fn name(&self) -> &'static str {
        "push"
    }

    fn on_motion(&mut self, sample: &MotionSample) -> Option<GestureEvent> {
        let now = sample.timestamp_ms;
        if now < self.cooldown_until {
            return None;
        }
        let v = sample.velocity;
        if v.z > -self.th.push_min_speed {
            return None;
        }
        let lateral = (v.x * v.x + v.y * v.y).sqrt();
        if v.z.abs() <= lateral {
            return None;
        }
        self.cooldown_until = now + self.th.cooldown_ms;
        Some(GestureEvent::Push {
            velocity: v.z.abs(),
        })
    }

    fn reset(&mut self) {
        self.cooldown_until = 0;
    }
}

/// Displacement past a distance threshold within a bounded time, classified
/// by dominant axis and sign.
pub struct SwipeDetector {
    th: Thresholds,
    anchor: Option<(Point3, u64)>,
    cooldown_until: u64,
}

impl SwipeDetector {
    pub fn new(th: Thresholds) -> Self {
        Self {
            th,
            anchor: None,
            cooldown_until: 0,
        }
    }
}

impl GestureListener for SwipeDetector {
    fn name(&self) -> &'static str {
        "swipe"
    }

    fn on_motion(&mut self, sample: &MotionSample) -> Option<GestureEvent> {
        let now = sample.timestamp_ms;
        if now < self.cooldown_until {
            self.anchor = None;
            return None;
        }
        let Some((start, t0)) = self.anchor else {
            self.anchor = Some((sample.position, now));
            return None;
        };
        if now.saturating_sub(t0) > self.th.swipe_max_ms {
            self.anchor = Some((sample.position, now));
            return None;
        }

        let dx = sample.position.x - start.x;
        let dy = sample.position.y - start.y;
        let event = if dx.abs() >= dy.abs() && dx.abs() >= self.th.swipe_min_dist {
            Some(if dx > 0.0 {
                GestureEvent::SwipeRight
            } else {
                GestureEvent::SwipeLeft
            })
        } else if dy.abs() > dx.abs() && dy.abs() >= self.th.swipe_min_dist {
            Some(if dy > 0.0 {
                GestureEvent::SwipeUp
            } else {
                GestureEvent::SwipeDown
            })
        } else {
            None
        };

        if event.is_some() {
            self.anchor = None;
            self.cooldown_until = now + self.th.cooldown_ms;
        }
        event
    }

    fn reset(&mut self) {
        self.anchor = None;
        self.cooldown_until = 0;
    }
}

/// Speed below a floor sustained for a minimum duration.
pub struct SteadyDetector {
    th: Thresholds,
    steady_since: Option<u64>,
    cooldown_until: u64,
}

impl SteadyDetector {
    pub fn new(th: Thresholds) -> Self {
        Self {
            th,
            steady_since: None,
            cooldown_until: 0,
        }
    }
}

impl GestureListener for SteadyDetector {
    fn name(&self) -> &'static str {
        "steady"
    }

    fn on_motion(&mut self, sample: &MotionSample) -> Option<GestureEvent> {
        let now = sample.timestamp_ms;
        if now < self.cooldown_until {
            return None;
        }
        if sample.velocity.magnitude() > self.th.steady_max_speed {
            self.steady_since = None;
            return None;
        }
        match self.steady_since {
            None => {
                self.steady_since = Some(now);
                None
            }
            Some(t0) if now.saturating_sub(t0) >= self.th.steady_min_ms => {
                self.steady_since = None;
                self.cooldown_until = now + self.th.cooldown_ms;
                Some(GestureEvent::Steady)
            }
            Some(_) => None,
        }
    }

    fn reset(&mut self) {
        self.steady_since = None;
        self.cooldown_until = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3;
    use crate::sensor::{MotionSample, SessionEvent};
    use crate::session::SessionDispatcher;

    fn sample(ts: u64, vx: f32, vy: f32, vz: f32) -> MotionSample {
        MotionSample {
            position: Point3::default(),
            velocity: Point3::new(vx, vy, vz),
            timestamp_ms: ts,
        }
    }

    fn sample_at(ts: u64, x: f32, y: f32) -> MotionSample {
        MotionSample {
            position: Point3::new(x, y, 1500.0),
            velocity: Point3::default(),
            timestamp_ms: ts,
        }
    }

    #[test]
    fn wave_fires_after_enough_flips() {
        let mut wave = WaveDetector::new(Thresholds::default());
        let mut fired = None;
        // alternate direction every 100ms at 300 mm/s
        for i in 0..12u64 {
            let vx = if i % 2 == 0 { 300.0 } else { -300.0 };
            if let Some(e) = wave.on_motion(&sample(i * 100, vx, 0.0, 0.0)) {
                fired = Some((i, e));
                break;
            }
        }
        let (i, e) = fired.expect("wave should fire");
        assert_eq!(e, GestureEvent::Wave);
        // default is 4 flips: first sample sets direction, flips happen on
        // samples 1..=4
        assert_eq!(i, 4);
    }

    #[test]
    fn slow_oscillation_is_not_a_wave() {
        let mut wave = WaveDetector::new(Thresholds::default());
        for i in 0..20u64 {
            let vx = if i % 2 == 0 { 50.0 } else { -50.0 };
            assert!(wave.on_motion(&sample(i * 100, vx, 0.0, 0.0)).is_none());
        }
    }

    #[test]
    fn push_fires_toward_sensor_with_cooldown() {
        let mut push = PushDetector::new(Thresholds::default());
        let e = push.on_motion(&sample(1000, 20.0, 0.0, -400.0));
        assert_eq!(e, Some(GestureEvent::Push { velocity: 400.0 }));
        // immediate repeat suppressed by cooldown
        assert!(push.on_motion(&sample(1033, 20.0, 0.0, -400.0)).is_none());
        // after cooldown it can fire again
        assert!(push.on_motion(&sample(2000, 20.0, 0.0, -400.0)).is_some());
    }

    #[test]
    fn lateral_motion_is_not_a_push() {
        let mut push = PushDetector::new(Thresholds::default());
        assert!(push.on_motion(&sample(0, 500.0, 0.0, -300.0)).is_none());
    }

    #[test]
    fn swipe_right_within_window() {
        let mut swipe = SwipeDetector::new(Thresholds::default());
        assert!(swipe.on_motion(&sample_at(0, 0.0, 0.0)).is_none());
        assert!(swipe.on_motion(&sample_at(100, 80.0, 0.0)).is_none());
        let e = swipe.on_motion(&sample_at(200, 180.0, 0.0));
        assert_eq!(e, Some(GestureEvent::SwipeRight));
    }

    #[test]
    fn swipe_up_on_dominant_y() {
        let mut swipe = SwipeDetector::new(Thresholds::default());
        swipe.on_motion(&sample_at(0, 0.0, 0.0));
        let e = swipe.on_motion(&sample_at(150, 30.0, 200.0));
        assert_eq!(e, Some(GestureEvent::SwipeUp));
    }

    #[test]
    fn too_slow_displacement_re_anchors() {
        let mut swipe = SwipeDetector::new(Thresholds::default());
        swipe.on_motion(&sample_at(0, 0.0, 0.0));
        // past the time window: distance covered does not count
        assert!(swipe.on_motion(&sample_at(1000, 200.0, 0.0)).is_none());
    }

    #[test]
    fn steady_fires_after_hold() {
        let mut steady = SteadyDetector::new(Thresholds::default());
        assert!(steady.on_motion(&sample(0, 5.0, 5.0, 0.0)).is_none());
        assert!(steady.on_motion(&sample(300, 5.0, 5.0, 0.0)).is_none());
        let e = steady.on_motion(&sample(600, 5.0, 5.0, 0.0));
        assert_eq!(e, Some(GestureEvent::Steady));
    }

    #[test]
    fn movement_restarts_steady_hold() {
        let mut steady = SteadyDetector::new(Thresholds::default());
        steady.on_motion(&sample(0, 5.0, 0.0, 0.0));
        steady.on_motion(&sample(300, 400.0, 0.0, 0.0));
        assert!(steady.on_motion(&sample(600, 5.0, 0.0, 0.0)).is_none());
        assert!(steady.on_motion(&sample(900, 5.0, 0.0, 0.0)).is_none());
        assert!(steady.on_motion(&sample(1200, 5.0, 0.0, 0.0)).is_some());
    }

    #[test]
    fn wave_then_push_fire_in_registration_order_same_tick() {
        let mut d = SessionDispatcher::new();
        d.add_listener(Box::new(WaveDetector::new(Thresholds::default())));
        d.add_listener(Box::new(PushDetector::new(Thresholds::default())));
        d.handle(&SessionEvent::Started {
            focus: Point3::default(),
        });

        // three flips without any push component
        for (i, vx) in [300.0f32, -300.0, 300.0, -300.0].iter().enumerate() {
            assert!(d.update(&sample(i as u64 * 100, *vx, 0.0, 0.0)).is_empty());
        }
        // final flip also satisfies the push criterion: vz dominates but the
        // x component still flips direction above the wave floor
        let fired = d.update(&sample(400, 300.0, 0.0, -400.0));
        let names: Vec<&str> = fired.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["wave", "push"]);
    }
}
