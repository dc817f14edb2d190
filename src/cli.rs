use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{env, process::Command};

use crate::config;
use crate::ipc;
use crate::sim::CYCLE_FRAMES;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("depthctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"shutdown"}))?;
            print_response(&r);
            Ok(())
        }

        Some("status") => {
            let r = ipc::client_request(serde_json::json!({"op":"status"}))?;
            print_response(&r);
            Ok(())
        }

        Some("reload") => {
            let r = ipc::client_request(serde_json::json!({"op":"reload"}))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: depthctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("list") => {
            let r = ipc::client_request(serde_json::json!({"op":"list"}))?;
            print_response(&r);
            Ok(())
        }

        Some("doctor") => {
            let r = ipc::client_request(serde_json::json!({"op":"doctor"}))?;
            print_response(&r);
            Ok(())
        }

        Some("run") => {
            let frames: u64 = pargs
                .opt_value_from_str("--frames")?
                .unwrap_or(CYCLE_FRAMES);
            let cfg = config::DaemonConfigState::load_or_install_default()?;
            let snap = ipc::pipeline::run_scripted(&cfg.profile, frames)?;
            println!("{}", serde_json::to_string_pretty(&snap)?);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        r#"depthctl — depth-camera gesture orchestration daemon

USAGE:
  depthctl help [command]     Show general or command-specific help
  depthctl start              Start the daemon
  depthctl stop               Stop the daemon
  depthctl status             Show session state, users, gesture counters
  depthctl reload             Reload active profile
  depthctl use <name>         Switch active profile
  depthctl list               List profiles
  depthctl doctor             Show backend and profile diagnostics
  depthctl run [--frames N]   Run one scripted capture in the foreground
                              and print the final snapshot as JSON

TIPS:
  - Profiles: ~/.config/depthctl/profiles
  - Active profile pointer: ~/.config/depthctl/active
  - The simulated backend replays a fixed scene; a hardware backend plugs
    in behind the same traits
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: depthctl start\nStarts the background daemon."),
        "stop" => println!("usage: depthctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: depthctl status\nShows the live pipeline snapshot: frames, session state, tracked users, gesture counters, arm crossings."
        ),
        "reload" => println!(
            "usage: depthctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: depthctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => {
            println!("usage: depthctl list\nLists available profiles.")
        }
        "doctor" => println!(
            "usage: depthctl doctor\nPrints backend capabilities and active profile settings."
        ),
        "run" => println!(
            "usage: depthctl run [--frames N]\nRuns a finite scripted capture in the foreground (default one full scene, {CYCLE_FRAMES} frames) and prints the final status snapshot."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
