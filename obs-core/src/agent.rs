//! The reporting agent
//!
//! An [`Agent`] holds the resolved collector endpoint, the tags stamped on
//! every event, and the producer side of the delivery pipeline. It is a cheap
//! `Clone` handle; every clone feeds the same queue and worker.
//!
//! Capture methods never block and never fail. They return the new event's
//! id as soon as the event is queued (or dropped because the queue is full).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::dispatch::{self, DispatchHandle, DispatchWorker, StatsSnapshot};
use crate::collector::{HttpTransport, Transport};
use crate::config::Options;
use crate::dsn::Dsn;
use crate::error::Result;
use crate::event::{Event, EventId, Level, StackFrame};
use crate::stack;

/// Extra key listing the `source()` chain of a captured error
pub const EXTRA_CAUSED_BY: &str = "caused_by";

/// Handle to a running agent
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

struct Inner {
    dsn: Dsn,
    environment: String,
    server_name: String,
    dispatch: DispatchHandle,
}

impl Agent {
    /// Resolve the DSN, start the dispatch worker and return the agent.
    pub fn new(options: Options) -> Result<Self> {
        let dsn = Dsn::parse(&options.dsn)?;
        let transport = HttpTransport::new(&dsn, Duration::from_secs(options.timeout_secs))?;
        Self::with_transport(options, Arc::new(transport))
    }

    /// Like [`Agent::new`], delivering through a caller-supplied transport.
    pub fn with_transport(options: Options, transport: Arc<dyn Transport>) -> Result<Self> {
        let (agent, worker) = Self::unstarted(options, transport)?;
        worker.spawn()?;
        Ok(agent)
    }

    /// Build the agent and its worker without starting the worker.
    pub(crate) fn unstarted(
        options: Options,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, DispatchWorker)> {
        options.validate()?;
        let dsn = Dsn::parse(&options.dsn)?;
        let server_name = options.resolved_server_name();
        let (dispatch, worker) = dispatch::channel(options.queue_capacity, transport);

        tracing::debug!(
            endpoint = %dsn.endpoint,
            environment = %options.environment,
            server_name = %server_name,
            capacity = options.queue_capacity,
            "Agent created"
        );

        let agent = Self {
            inner: Arc::new(Inner {
                dsn,
                environment: options.environment,
                server_name,
                dispatch,
            }),
        };
        Ok((agent, worker))
    }

    /// Report an error with the stack at the call site.
    ///
    /// The message is the error's `Display`; its `source()` chain, if any, is
    /// attached as the `caused_by` extra.
    pub fn capture_exception<E>(&self, err: &E) -> EventId
    where
        E: std::error::Error + ?Sized,
    {
        let stacktrace = stack::capture(0);

        let mut extra = BTreeMap::new();
        let causes = source_chain(err);
        if !causes.is_empty() {
            extra.insert(EXTRA_CAUSED_BY.to_string(), serde_json::json!(causes));
        }

        self.capture_event(Level::Error, err.to_string(), stacktrace, extra)
    }

    /// Report the error of a failed result. `Ok` reports nothing and returns
    /// an empty id.
    pub fn capture_result<T, E>(&self, result: &std::result::Result<T, E>) -> EventId
    where
        E: std::error::Error,
    {
        match result {
            Ok(_) => EventId::none(),
            Err(err) => self.capture_exception(err),
        }
    }

    /// Report an informational message (no stack).
    pub fn capture_message(&self, message: &str) -> EventId {
        self.capture_message_with_level(message, Level::Info)
    }

    /// Report a message at the given level (no stack).
    pub fn capture_message_with_level(&self, message: &str, level: Level) -> EventId {
        self.capture_event(level, message, Vec::new(), BTreeMap::new())
    }

    /// Build an event from the agent's tags and queue it for delivery.
    pub fn capture_event(
        &self,
        level: Level,
        message: impl Into<String>,
        stacktrace: Vec<StackFrame>,
        extra: BTreeMap<String, serde_json::Value>,
    ) -> EventId {
        let event = Event::new(level, message)
            .with_stacktrace(stacktrace)
            .with_tags(&self.inner.server_name, &self.inner.environment)
            .with_extra(extra);
        let id = event.id();
        self.inner.dispatch.enqueue(event);
        id
    }

    /// Stop accepting events and wait up to `timeout` for the queue to drain.
    ///
    /// Returns true if the drain finished in time. The worker keeps draining
    /// after a timeout. Calling this again only waits again.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.inner.dispatch.flush(timeout)
    }

    /// Start the drain without waiting for it.
    pub fn shutdown(&self) {
        self.inner.dispatch.shutdown();
    }

    /// Collector endpoint, `scheme://host[:port]`
    pub fn endpoint(&self) -> &str {
        &self.inner.dsn.endpoint
    }

    pub fn api_key(&self) -> &str {
        &self.inner.dsn.api_key
    }

    pub fn environment(&self) -> &str {
        &self.inner.environment
    }

    pub fn server_name(&self) -> &str {
        &self.inner.server_name
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.dispatch.capacity()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.dispatch.stats()
    }

    /// True when both handles point at the same agent.
    pub fn ptr_eq(&self, other: &Agent) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("endpoint", &self.inner.dsn.endpoint)
            .field("api_key", &"<redacted>")
            .field("environment", &self.inner.environment)
            .field("server_name", &self.inner.server_name)
            .field("stats", &self.stats())
            .finish()
    }
}

fn source_chain<E>(err: &E) -> Vec<String>
where
    E: std::error::Error + ?Sized,
{
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes
}
