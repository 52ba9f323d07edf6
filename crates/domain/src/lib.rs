//! # thingpin-domain
//!
//! Pure domain model for the thingpin input monitor.
//!
//! ## Responsibilities
//! - Foundational types: [`Level`](level::Level), [`LineId`](line::LineId),
//!   resistor and pin-numbering modes
//! - The per-line [`Debouncer`](debounce::Debouncer) that turns raw samples
//!   into accepted [`Transition`](debounce::Transition)s
//! - Static thing configuration and its validation
//! - The error taxonomy shared by every layer
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod debounce;
pub mod error;
pub mod level;
pub mod line;
pub mod thing;
