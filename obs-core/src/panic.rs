//! Panic capture
//!
//! Two ways to turn a panic into an `error` event on the installed agent:
//!
//! - [`recover`] runs a closure and, if it panics, reports the panic and
//!   swallows it.
//! - [`install_hook`] reports every other panic from the process panic hook,
//!   then hands over to the previously installed hook.
//!
//! Both capture the stack from inside the panic hook, while the panicking
//! frames are still on it, and record the panic site as `panic.location`.
//! A panic inside [`recover`] is reported once even when the hook is also
//! installed.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::panic::{self, Location, UnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use crate::event::{EventId, Level, StackFrame};
use crate::global;
use crate::stack;

/// Extra key holding `file:line:column` of the panic
pub const EXTRA_LOCATION: &str = "panic.location";

thread_local! {
    static RECOVER_DEPTH: Cell<usize> = const { Cell::new(0) };
    /// Panic seen by the hook while a `recover` was running on this thread
    static CAUGHT: RefCell<Option<CaughtPanic>> = const { RefCell::new(None) };
    /// Set while one of our hooks handles a panic, so chained copies skip it
    static HANDLING: Cell<bool> = const { Cell::new(false) };
}

static RECOVER_HOOK: Once = Once::new();
static REPORT_UNCAUGHT: AtomicBool = AtomicBool::new(false);

/// A panic as seen from the hook
#[derive(Debug)]
struct CaughtPanic {
    message: String,
    stacktrace: Vec<StackFrame>,
    extra: BTreeMap<String, serde_json::Value>,
}

impl CaughtPanic {
    fn new(message: String, location: Option<&Location<'_>>) -> Self {
        let mut extra = BTreeMap::new();
        if let Some(location) = location {
            extra.insert(
                EXTRA_LOCATION.to_string(),
                serde_json::json!(format!(
                    "{}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                )),
            );
        }
        Self {
            message,
            stacktrace: stack::capture(0),
            extra,
        }
    }

    fn report(self) -> EventId {
        global::capture_event(Level::Error, self.message, self.stacktrace, self.extra)
    }
}

/// Run `f`, reporting and suppressing a panic.
///
/// Returns `None` if `f` panicked.
pub fn recover<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + UnwindSafe,
{
    RECOVER_HOOK.call_once(set_chained_hook);

    let outermost = RECOVER_DEPTH.with(|d| d.replace(d.get() + 1)) == 0;
    if outermost {
        CAUGHT.with(|c| c.borrow_mut().take());
    }
    let result = panic::catch_unwind(f);
    RECOVER_DEPTH.with(|d| d.set(d.get() - 1));

    match result {
        Ok(value) => Some(value),
        Err(payload) => {
            // Empty when another hook replaced ours; the stack then starts
            // at this call rather than at the panic site
            let caught = CAUGHT
                .with(|c| c.borrow_mut().take())
                .unwrap_or_else(|| CaughtPanic::new(panic_message(payload.as_ref()), None));
            caught.report();
            None
        }
    }
}

/// Report every panic through the installed agent, then run the previous
/// hook (by default the one printing the panic to stderr).
pub fn install_hook() {
    REPORT_UNCAUGHT.store(true, Ordering::Relaxed);
    set_chained_hook();
}

fn set_chained_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let first = HANDLING.try_with(|h| !h.replace(true)).unwrap_or(false);
        if first {
            handle_panic(panic_message(info.payload()), info.location());
        }
        previous(info);
        if first {
            let _ = HANDLING.try_with(|h| h.set(false));
        }
    }));
}

fn handle_panic(message: String, location: Option<&Location<'_>>) {
    let recovering = RECOVER_DEPTH.try_with(|d| d.get() > 0).unwrap_or(false);
    if recovering {
        let caught = CaughtPanic::new(message, location);
        let _ = CAUGHT.try_with(|c| *c.borrow_mut() = Some(caught));
    } else if REPORT_UNCAUGHT.load(Ordering::Relaxed) {
        CaughtPanic::new(message, location).report();
    }
}

/// Text of a panic payload, as `std` would print it.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
