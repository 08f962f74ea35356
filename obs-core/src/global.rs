//! Process-wide agent
//!
//! Most applications report through one agent installed at startup and use
//! the free functions in this module from anywhere. The reference is held in
//! a reader/writer lock: captures take the read lock just long enough to
//! clone the handle, replacement takes the write lock. The lock guards only
//! the reference, never the agent's internals.
//!
//! With no agent installed, every capture is a no-op returning an empty id
//! and [`flush`] returns true.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::agent::Agent;
use crate::config::Options;
use crate::event::{EventId, Level, StackFrame};
use crate::logging;

static CURRENT: RwLock<Option<Agent>> = RwLock::new(None);

/// Create an agent from `options` and install it.
///
/// On an invalid DSN (or any other setup error) the problem is logged and the
/// previously installed agent, if any, stays in place. Returns whether a new
/// agent was installed.
pub fn init(options: Options) -> bool {
    match Agent::new(options) {
        Ok(agent) => {
            install(agent);
            true
        }
        Err(e) => {
            logging::diagnose(|| {
                tracing::error!(error = %e, "obs: invalid configuration, agent not initialized")
            });
            false
        }
    }
}

/// Install `agent` as the process-wide agent.
///
/// The replaced agent, if any, is told to shut down so its worker drains and
/// exits instead of lingering; it is returned so the caller can
/// [`Agent::flush`] it if delivery of its backlog matters.
pub fn install(agent: Agent) -> Option<Agent> {
    let previous = CURRENT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(agent);

    if let Some(previous) = &previous {
        tracing::debug!(endpoint = %previous.endpoint(), "Replacing installed agent");
        previous.shutdown();
    }
    previous
}

/// Remove the installed agent without shutting it down.
pub fn uninstall() -> Option<Agent> {
    CURRENT.write().unwrap_or_else(PoisonError::into_inner).take()
}

/// Snapshot of the installed agent.
pub fn current() -> Option<Agent> {
    CURRENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Report an error through the installed agent.
pub fn capture_exception<E>(err: &E) -> EventId
where
    E: std::error::Error + ?Sized,
{
    match current() {
        Some(agent) => agent.capture_exception(err),
        None => EventId::none(),
    }
}

/// Report the error of a failed result; `Ok` reports nothing.
pub fn capture_result<T, E>(result: &std::result::Result<T, E>) -> EventId
where
    E: std::error::Error,
{
    match current() {
        Some(agent) => agent.capture_result(result),
        None => EventId::none(),
    }
}

/// Report an informational message through the installed agent.
pub fn capture_message(message: &str) -> EventId {
    capture_message_with_level(message, Level::Info)
}

pub fn capture_message_with_level(message: &str, level: Level) -> EventId {
    match current() {
        Some(agent) => agent.capture_message_with_level(message, level),
        None => EventId::none(),
    }
}

pub fn capture_event(
    level: Level,
    message: impl Into<String>,
    stacktrace: Vec<StackFrame>,
    extra: BTreeMap<String, serde_json::Value>,
) -> EventId {
    match current() {
        Some(agent) => agent.capture_event(level, message, stacktrace, extra),
        None => EventId::none(),
    }
}

/// Like [`init`], returning a [`FlushGuard`] that flushes the installed
/// agent when it goes out of scope. `None` if the agent was not installed.
///
/// ```rust,no_run
/// let _obs = obs_core::init_guard(obs_core::Options::new("http://mykey@localhost:8000"));
/// obs_core::capture_message("Application started");
/// // delivered when `_obs` is dropped
/// ```
pub fn init_guard(options: Options) -> Option<FlushGuard> {
    let timeout = Duration::from_secs(options.flush_timeout_secs);
    init(options).then(|| FlushGuard::new(timeout))
}

/// Flushes the installed agent on drop.
///
/// The process-wide agent is never dropped on its own, so queued events are
/// lost at exit unless something flushes them. Hold one of these in `main`.
#[must_use = "the guard flushes when dropped; bind it to a named variable"]
#[derive(Debug)]
pub struct FlushGuard {
    timeout: Duration,
}

impl FlushGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if !flush(self.timeout) {
            logging::diagnose(|| {
                tracing::warn!(
                    timeout = ?self.timeout,
                    "obs: pending events not delivered before exit"
                )
            });
        }
    }
}

/// Drain the installed agent, waiting at most `timeout`.
///
/// Returns true when there is nothing to flush.
pub fn flush(timeout: Duration) -> bool {
    match current() {
        Some(agent) => agent.flush(timeout),
        None => true,
    }
}
