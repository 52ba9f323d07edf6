//! # thingpin-adapter-virtual
//!
//! Virtual adapter — simulated input lines and a logging publisher, for
//! tests and for running thingpin on a machine without GPIO.
//!
//! | Type | Port | Behaviour |
//! |------|------|-----------|
//! | [`VirtualLines`] | `LineDriver` | Scripted or externally driven lines |
//! | [`LogPublisher`] | `Publisher` | Logs and records every notification |
//!
//! ## Dependency rule
//!
//! Depends on `thingpin-app` (port traits) and `thingpin-domain` only.

mod lines;
mod publisher;

pub use lines::VirtualLines;
pub use publisher::{LogPublisher, Notification};
