//! Call-stack capture
//!
//! Frames come from `std::backtrace::Backtrace`, whose text rendering looks
//! like:
//!
//! ```text
//!    0: std::backtrace::Backtrace::create
//!              at /rustc/.../library/std/src/backtrace.rs:331:13
//!    1: app::handlers::checkout
//!              at ./src/handlers.rs:42:9
//! ```
//!
//! Capture is forced, so `RUST_BACKTRACE` does not need to be set. Builds
//! without debug info still produce frames, just without file and line.

use std::backtrace::Backtrace;
use std::sync::OnceLock;

use regex::Regex;

use crate::event::StackFrame;

/// Maximum number of frames kept per event
pub const MAX_FRAMES: usize = 50;

/// Leading frames that belong to the capture machinery rather than the caller
const INTERNAL_PREFIXES: &[&str] = &[
    "std::backtrace",
    "backtrace::",
    "obs_core::stack::capture",
    "obs_core::agent::Agent::",
    "<obs_core::agent::Agent>::",
    "obs_core::global::",
    "obs_core::panic::CaughtPanic",
    "<obs_core::panic::CaughtPanic>",
    "obs_core::panic::handle_panic",
    "obs_core::panic::set_chained_hook",
    "obs_core::panic::recover",
    "std::panicking::",
    "std::rt::",
    "core::panicking::",
    "std::sys::backtrace::",
    "std::sys_common::backtrace::",
    "rust_begin_unwind",
    "__rustc::rust_begin_unwind",
    "<alloc::boxed::Box<F",
];

fn frame_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d+):\s+(?:0x[0-9a-f]+\s+-\s+)?(.+)$").expect("valid frame regex")
    })
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s+at\s+(.+?):(\d+)(?::(\d+))?$").expect("valid location regex")
    })
}

/// Capture the current call stack, innermost frame first.
///
/// Frames of the capture machinery itself are dropped, then `skip` more
/// frames are skipped so wrappers can hide themselves.
pub fn capture(skip: usize) -> Vec<StackFrame> {
    let backtrace = Backtrace::force_capture();
    let frames = parse_backtrace(&backtrace.to_string());
    trim_internal(frames, skip)
}

/// Parse the text rendering of a Rust backtrace into frames.
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = location_re().captures(line) {
            if let Some(last) = frames.last_mut() {
                if last.filename.is_empty() {
                    last.filename = caps[1].to_string();
                    last.lineno = caps[2].parse().unwrap_or(0);
                }
            }
            continue;
        }

        if let Some(caps) = frame_re().captures(line) {
            frames.push(StackFrame {
                filename: String::new(),
                function: strip_hash(caps[2].trim()).to_string(),
                lineno: 0,
            });
        }
    }

    frames
}

fn trim_internal(frames: Vec<StackFrame>, skip: usize) -> Vec<StackFrame> {
    frames
        .into_iter()
        .skip_while(|f| is_internal(&f.function))
        .skip(skip)
        .take(MAX_FRAMES)
        .collect()
}

fn is_internal(function: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|p| function.starts_with(p))
}

/// Drop the `::h0123456789abcdef` suffix of legacy-mangled symbols.
fn strip_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/abc/library/std/src/../../backtrace/src/backtrace/libunwind.rs:116:5
   1: std::backtrace::Backtrace::create
             at /rustc/abc/library/std/src/backtrace.rs:331:13
   2: obs_core::stack::capture
             at ./src/stack.rs:62:21
   3: app::checkout::h0123456789abcdef
             at ./src/checkout.rs:42:9
   4: app::main
             at ./src/main.rs:7
   5: <unknown>
";

    #[test]
    fn test_parse_backtrace() {
        let frames = parse_backtrace(SAMPLE);
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[3].function, "app::checkout");
        assert_eq!(frames[3].filename, "./src/checkout.rs");
        assert_eq!(frames[3].lineno, 42);
        assert_eq!(frames[4].lineno, 7);
        assert_eq!(frames[5].function, "<unknown>");
        assert_eq!(frames[5].filename, "");
    }

    #[test]
    fn test_trim_internal_frames() {
        let frames = trim_internal(parse_backtrace(SAMPLE), 0);
        assert_eq!(frames[0].function, "app::checkout");

        let frames = trim_internal(parse_backtrace(SAMPLE), 1);
        assert_eq!(frames[0].function, "app::main");
    }

    #[test]
    fn test_trim_panic_hook_frames() {
        let sample = "   0: std::backtrace::Backtrace::force_capture
   1: obs_core::stack::capture
   2: obs_core::panic::CaughtPanic::new
   3: obs_core::panic::handle_panic
   4: obs_core::panic::set_chained_hook::{{closure}}
   5: <alloc::boxed::Box<F,A> as core::ops::function::Fn<Args>>::call
   6: std::panicking::rust_panic_with_hook
   7: std::panicking::begin_panic_handler::{{closure}}
   8: std::sys::backtrace::__rust_end_short_backtrace
   9: rust_begin_unwind
  10: core::panicking::panic_fmt
  11: app::orders::reject
  12: obs_core::panic::recover
";
        let frames = trim_internal(parse_backtrace(sample), 0);
        assert_eq!(frames[0].function, "app::orders::reject");
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_strip_hash() {
        assert_eq!(strip_hash("app::run::h0123456789abcdef"), "app::run");
        assert_eq!(strip_hash("app::handler"), "app::handler");
        assert_eq!(strip_hash("app::hello"), "app::hello");
    }

    #[test]
    fn test_capture_is_innermost_first() {
        let frames = capture(0);
        assert!(!frames.is_empty());
        assert!(frames.len() <= MAX_FRAMES);
        assert!(!frames[0].function.starts_with("std::backtrace"));
        assert!(frames
            .iter()
            .any(|f| f.function.contains("test_capture_is_innermost_first")));
    }
}
