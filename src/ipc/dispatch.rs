use anyhow::{Result, anyhow};
use log::info;
use std::sync::{Arc, Mutex};

use crate::config::Profile;
use crate::session::GestureEvent;

/// Apply the profile binding for a fired gesture. Bindings are read from
/// the live profile so a `reload` takes effect without restarting the
/// pipeline.
pub fn dispatch_gesture(event: &GestureEvent, profile_arc: &Arc<Mutex<Profile>>) -> Result<()> {
    let key = event.key();
    let action = {
        let p = profile_arc.lock().unwrap();
        p.bindings.get(key).cloned().unwrap_or_default()
    };

    if action.is_empty() || action == "none" {
        return Ok(());
    }
    if action == "count" {
        // snapshot counters are bumped by the pipeline for every fired
        // gesture; nothing more to do here
        return Ok(());
    }
    if let Some(msg) = action.strip_prefix("log:") {
        match event {
            GestureEvent::Push { velocity } => {
                info!("gesture {key} ({velocity:.0} mm/s): {}", msg.trim());
            }
            _ => info!("gesture {key}: {}", msg.trim()),
        }
        return Ok(());
    }

    Err(anyhow!("unknown action mapping for {key} -> '{action}'"))
}
