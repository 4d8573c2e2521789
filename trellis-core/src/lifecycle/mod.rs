//! Addin lifecycle: status graph, listeners and the engine driving them
//!
//! ```text
//! Discovered -> Resolved -> Started -> Stopping -> Stopped
//!      \            \           \          \
//!       +------------+-----------+----------+--> Failed
//! ```

mod engine;
mod listener;
mod status;

pub use engine::{AddinEngine, AddinInfo, EngineBuilder};
pub use listener::{FnListener, StatusListener, listener_fn};
pub use status::{AddinFailure, AddinStatus, StatusEvent};
