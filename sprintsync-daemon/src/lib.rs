//! Scheduler daemon: one full sync at startup, then incremental syncs on a
//! fixed interval until ctrl-c.

mod clients;
mod error;
mod runtime;

pub use clients::Clients;
pub use error::DaemonError;
pub use runtime::{init_tracing, run, schedule, start_blocking, RunSummary};
