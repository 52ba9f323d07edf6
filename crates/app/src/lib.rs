//! # thingpin-app
//!
//! Application layer — line watchers, the orchestrator, and **port
//! definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `LineDriver` — configure, sample and wait on digital input lines
//!   - `Publisher` — deliver a thing's state to the remote sink
//! - Drive one [`LineWatcher`](watcher::LineWatcher) per line, feeding raw
//!   samples through the domain debouncer
//! - Fan accepted transitions into the [`Thingpin`](thingpin::Thingpin)
//!   orchestrator, which maps them to payloads, publishes them and runs the
//!   heartbeat
//!
//! ## Dependency rule
//! Depends on `thingpin-domain` only (plus `tokio` for tasks, channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod cost;
pub mod error;
pub mod ports;
pub mod thingpin;
pub mod watcher;

#[cfg(test)]
mod testing;
