//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod line_driver;
pub mod publisher;

pub use line_driver::{EdgeWait, LineDriver};
pub use publisher::Publisher;
