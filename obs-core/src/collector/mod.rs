//! Delivery to the obs collector
//!
//! - [`client`]: the [`Transport`] seam and its HTTP implementation
//! - [`dispatch`]: the bounded queue and the background worker that drains it
//!
//! Delivery is fire-and-forget. A failed send is logged and the event
//! discarded; nothing is retried and no error reaches the code that captured
//! the event.

pub mod client;
pub mod dispatch;

pub use client::{HttpTransport, Transport, API_KEY_HEADER};
pub use dispatch::{DispatchHandle, DispatchWorker, StatsSnapshot};
