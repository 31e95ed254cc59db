//! revwatch daemon runtime: scheduler + HTTP trigger + socket server, all
//! feeding one reconcile processor.

mod error;
mod http;
mod jobs;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use jobs::RunSummary;
pub use protocol::{ControlClient, ControlRequest, ControlResponse};
pub use runtime::{run, start_blocking, RunStats};
