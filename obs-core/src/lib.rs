//! # obs-core
//!
//! In-process error and message reporting for the obs collector.
//!
//! Application code reports errors and messages; the agent queues them and a
//! background worker delivers them over HTTP. Reporting never blocks and
//! never fails the caller:
//! - a full queue drops the event (the caller still gets its id)
//! - a failed delivery is logged and the event discarded
//! - with no agent initialized, captures are no-ops returning an empty id
//!
//! ## Architecture
//!
//! - [`dsn`]: `scheme://apikey@host[:port]` into endpoint + API key
//! - [`event`]: the event record, its JSON wire shape and id generation
//! - [`stack`]: call-stack capture
//! - [`collector`]: the HTTP transport and the dispatch worker
//! - [`agent`]: the [`Agent`] handle owning queue and worker
//! - [`global`]: the process-wide agent and free capture functions
//! - [`panic`]: panic recovery and panic hook
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! obs_core::init(
//!     obs_core::Options::new("http://mykey@localhost:8000")
//!         .environment("production")
//!         .server_name("web-1"),
//! );
//!
//! obs_core::capture_message("Application started");
//!
//! if let Err(e) = std::fs::read_to_string("/etc/app.toml") {
//!     obs_core::capture_exception(&e);
//! }
//!
//! // Deliver everything before exiting
//! obs_core::flush(Duration::from_secs(5));
//! ```

// Re-export commonly used items at the crate root
pub use agent::Agent;
pub use collector::{HttpTransport, StatsSnapshot, Transport};
pub use config::{Config, Options};
pub use dsn::Dsn;
pub use error::{Error, Result};
pub use event::{Event, EventId, Level, StackFrame};
pub use global::{
    capture_event, capture_exception, capture_message, capture_message_with_level,
    capture_result, current, flush, init, init_guard, install, uninstall, FlushGuard,
};
pub use panic::{install_hook, recover};

// Public modules
pub mod agent;
pub mod collector;
pub mod config;
pub mod dsn;
pub mod error;
pub mod event;
pub mod global;
pub mod logging;
pub mod panic;
pub mod stack;
