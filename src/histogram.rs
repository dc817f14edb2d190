//! Depth frames and the per-frame depth-to-intensity lookup table.
//!
//! The table maps each raw depth value to a display brightness by its
//! percentile rank among the frame's valid pixels: near, common depths come
//! out bright, far ones dim. It is rebuilt from scratch every frame; no
//! state survives across frames.

/// One acquisition tick of per-pixel distances, in millimeters.
/// A value of 0 means "no reading" at that pixel.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    width: usize,
    height: usize,
    data: Vec<u16>,
}

impl DepthFrame {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, depth: u16) {
        self.data[y * self.width + x] = depth;
    }

    pub fn pixels(&self) -> &[u16] {
        &self.data
    }
}

/// Lookup table from raw depth value to a 0–255 intensity.
///
/// Entry 0 is always 0, reserved as "no histogram color — render the
/// camera/background pixel instead". Renderers compose with
/// `if lut.intensity(d) == 0 { background } else { tint }`.
#[derive(Debug, Clone, Default)]
pub struct HistogramLut {
    levels: Vec<u8>,
}

impl HistogramLut {
    /// Build the table for one frame. `max_depth` is the sensor's maximum
    /// range; the table has `max_depth + 1` entries. Readings past the max
    /// clamp into the last bucket.
    pub fn compute(frame: &DepthFrame, max_depth: u16) -> Self {
        let len = max_depth as usize + 1;
        let mut acc = vec![0u32; len];
        let mut valid = 0u32;

        for &d in frame.pixels() {
            if d != 0 {
                acc[(d as usize).min(len - 1)] += 1;
                valid += 1;
            }
        }

        for i in 1..len {
            acc[i] += acc[i - 1];
        }

        let mut levels = vec![0u8; len];
        if valid > 0 {
            for i in 1..len {
                levels[i] = (255.0 * (1.0 - acc[i] as f32 / valid as f32)).round() as u8;
            }
        }

        Self { levels }
    }

    /// Intensity for a raw depth value; out-of-range depths read as 0.
    pub fn intensity(&self, depth: u16) -> u8 {
        self.levels.get(depth as usize).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.levels
    }
}
