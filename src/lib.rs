//! Orchestration layer for depth-camera gesture middleware: depth histogram
//! display tables, per-user calibration lifecycle, hand trails, crossed-arm
//! detection, and session-scoped gesture dispatch, fronted by a unix-socket
//! daemon and CLI.

pub mod cli;
pub mod config;
pub mod detectors;
pub mod geometry;
pub mod histogram;
pub mod ipc;
pub mod lifecycle;
pub mod logging;
pub mod sensor;
pub mod session;
pub mod sim;
pub mod snapshot;
pub mod trail;
