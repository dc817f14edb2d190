//! Control plane: unix-socket daemon, newline-delimited JSON requests, and
//! the background pipeline thread the daemon supervises.

pub mod dispatch;
pub mod pipeline;
pub mod runtime;
pub mod server;

pub use server::{client_request, run_daemon};
