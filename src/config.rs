use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Deserializer};
use std::{collections::HashMap, fs, io::Write, path::PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

/// Sensor-side settings: frame geometry, range, and lifecycle tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorSettings {
    pub width: usize,
    pub height: usize,
    pub max_depth: u16,
    pub trail_capacity: usize,
    pub calibration_retry_limit: u32,
}

/// Focus-gesture configuration handed to the external session source.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub focus_gestures: String,
    pub refocus_gesture: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    pub wave_flips: u32,
    pub wave_min_speed: f32,
    pub wave_window_ms: u64,
    pub push_min_speed: f32,
    pub swipe_min_dist: f32,
    pub swipe_max_ms: u64,
    pub steady_max_speed: f32,
    pub steady_min_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            wave_flips: 4,
            wave_min_speed: 120.0,
            wave_window_ms: 900,
            push_min_speed: 250.0,
            swipe_min_dist: 150.0,
            swipe_max_ms: 400,
            steady_max_speed: 60.0,
            steady_min_ms: 500,
            cooldown_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub sensor: SensorSettings,
    pub session: SessionSettings,
    pub thresholds: Thresholds,

    // Accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,
}

// --------- tolerant bindings deserializer ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ---------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> PathBuf {
    let home = UserDirs::new().unwrap().home_dir().to_path_buf();
    home.join(".config").join("depthctl")
}

fn profiles_dir() -> PathBuf {
    config_dir().join("profiles")
}

fn active_ptr_path() -> PathBuf {
    config_dir().join("active")
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir();
        let profdir = profiles_dir();
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = active_ptr_path();
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = Self::load_profile(&active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.profile = Self::load_profile(&self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.reload()?;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    fn load_profile(name: &str) -> Result<Profile> {
        let path = profiles_dir().join(format!("{name}.toml"));
        let txt = fs::read_to_string(&path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        parse_profile(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let s = &self.profile.sensor;
        serde_json::json!({
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "backend": "simulated (hardware plugs in behind the SensorSource trait)",
            "frame": format!("{}x{}", s.width, s.height),
            "max_depth_mm": s.max_depth,
            "trail_capacity": s.trail_capacity,
            "focus_gestures": self.profile.session.focus_gestures,
        })
    }
}

pub fn parse_profile(text: &str) -> Result<Profile> {
    let profile: Profile = toml::from_str(text).map_err(|e| anyhow!("parse error: {e}"))?;
    validate_profile(&profile)?;
    Ok(profile)
}

/// A built-in profile for foreground demo runs and tests; no filesystem.
pub fn builtin_profile() -> Profile {
    parse_profile(default_profile_text()).expect("bundled default profile must parse")
}

const GESTURE_KEYS: &[&str] = &[
    "wave",
    "push",
    "swipe_up",
    "swipe_down",
    "swipe_left",
    "swipe_right",
    "steady",
];

fn validate_profile(p: &Profile) -> Result<()> {
    let s = &p.sensor;
    if s.width == 0 || s.height == 0 {
        return Err(anyhow!("sensor.width and sensor.height must be positive"));
    }
    if s.max_depth == 0 {
        return Err(anyhow!("sensor.max_depth must be positive"));
    }
    if s.trail_capacity == 0 {
        return Err(anyhow!("sensor.trail_capacity must be positive"));
    }

    let t = &p.thresholds;
    if t.wave_flips == 0 || t.wave_window_ms == 0 || t.swipe_max_ms == 0 || t.steady_min_ms == 0 {
        return Err(anyhow!("thresholds must be positive durations/counts"));
    }
    if t.wave_min_speed <= 0.0 || t.push_min_speed <= 0.0 || t.swipe_min_dist <= 0.0 {
        return Err(anyhow!("threshold speeds/distances must be positive"));
    }

    if p.session.focus_gestures.trim().is_empty() {
        return Err(anyhow!("session.focus_gestures must not be empty"));
    }
    if p.session.refocus_gesture.trim().is_empty() {
        return Err(anyhow!("session.refocus_gesture must not be empty"));
    }

    for (k, v) in &p.bindings {
        if !GESTURE_KEYS.contains(&k.as_str()) {
            return Err(anyhow!("binding '{}' is not a known gesture key", k));
        }
        if v.trim().is_empty() {
            return Err(anyhow!("binding '{}' has empty action", k));
        }
        let ok = v.starts_with("log:") || v == "count" || v == "none";
        if !ok {
            return Err(anyhow!("binding '{}' has invalid action '{}'", k, v));
        }
    }
    Ok(())
}
