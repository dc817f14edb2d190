use anyhow::Result;
use log::{error, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    sync::atomic::{AtomicBool, Ordering},
    sync::mpsc::Sender,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use super::pipeline::run_pipeline;
use super::runtime::socket_path;
use crate::config::{DaemonConfigState, Profile};
use crate::snapshot::SharedSnapshot;

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path();
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);

    // cooperative stop: signals and the shutdown op share one flag
    let stop = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, stop.clone())?;
    flag::register(SIGTERM, stop.clone())?;

    // channels
    let (tx_req, rx_req) = std::sync::mpsc::channel::<IpcMsg>();

    // pipeline thread
    let shared = SharedSnapshot::new();
    let mut pipeline = PipelineThread::start(cfg.profile.clone(), shared.clone(), stop.clone());

    // accept loop
    listener.set_nonblocking(true)?;
    loop {
        if stop.load(Ordering::Relaxed) {
            info!("daemon: stop requested");
            break;
        }

        if let Ok((stream, _)) = listener.accept() {
            let tx = tx_req.clone();
            let cfg_view = cfg.clone();
            let snap = shared.clone();
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, cfg_view, snap, tx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload => {
                    if let Err(e) = cfg.reload() {
                        error!("reload failed: {e}");
                    } else {
                        pipeline.update_profile(cfg.profile.clone());
                        info!("profile reloaded");
                    }
                }
                IpcMsg::UseProfile(name) => {
                    if let Err(e) = cfg.set_active(&name) {
                        error!("use profile failed: {e}");
                    } else {
                        pipeline.update_profile(cfg.profile.clone());
                        info!("switched active profile to {}", cfg.active_name);
                    }
                }
                IpcMsg::Shutdown => {
                    stop.store(true, Ordering::Relaxed);
                }
            }
        }

        thread::sleep(Duration::from_millis(5));
    }

    pipeline.join();
    let _ = std::fs::remove_file(&sock);
    Ok(())
}

fn handle_client(
    mut stream: UnixStream,
    st: DaemonConfigState,
    shared: SharedSnapshot,
    tx_req: Sender<IpcMsg>,
) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = match op {
        "status" => serde_json::json!({"ok": true, "data": {
            "active_profile": st.active_name,
            "socket": socket_path(),
            "snapshot": serde_json::to_value(shared.read())?,
        }}),
        "reload" => {
            let _ = tx_req.send(IpcMsg::Reload);
            serde_json::json!({"ok": true, "data": {"active_profile": st.active_name}})
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            let _ = tx_req.send(IpcMsg::UseProfile(name.to_string()));
            serde_json::json!({"ok": true, "data": {"active_profile": name}})
        }
        "list" => {
            let list = st.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": st.active_name}})
        }
        "doctor" => {
            let report = st.doctor_report();
            serde_json::json!({"ok": true, "data": report})
        }
        "shutdown" => {
            let _ = tx_req.send(IpcMsg::Shutdown);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };

    write!(stream, "{}\n", resp)?;
    Ok(())
}

enum IpcMsg {
    Reload,
    UseProfile(String),
    Shutdown,
}

struct PipelineThread {
    profile: Arc<Mutex<Profile>>,
    handle: thread::JoinHandle<()>,
}

impl PipelineThread {
    fn start(profile: Profile, shared: SharedSnapshot, stop: Arc<AtomicBool>) -> Self {
        let profile_arc = Arc::new(Mutex::new(profile));
        let prof_clone = profile_arc.clone();
        let handle = thread::spawn(move || {
            if let Err(e) = run_pipeline(prof_clone, shared, stop) {
                error!("pipeline failed: {e}");
            }
        });
        Self {
            profile: profile_arc,
            handle,
        }
    }

    fn update_profile(&mut self, new_profile: Profile) {
        if let Ok(mut p) = self.profile.lock() {
            *p = new_profile;
        }
    }

    fn join(self) {
        let _ = self.handle.join();
    }
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path();
    if !sock.exists() {
        return Err(anyhow::anyhow!(
            "depthctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
