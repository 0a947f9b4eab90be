// Command Queue - API Core
//
// Hosts the command queue behind an HTTP API: submission, observation,
// a server-sent event stream of lifecycle changes, and scheduled housekeeping.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
