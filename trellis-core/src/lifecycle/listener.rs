//! Host hooks invoked on status changes

use crate::error::EngineError;
use crate::framework::Framework;

use super::StatusEvent;

/// Synchronous status hook, run on the control thread inside the transition.
///
/// A listener reacting to `Started` performs its registration side effects
/// (attaching trees, publishing properties); on `Stopping` it reverses them
/// while the addin's code is still loaded. Returning an error fails the
/// addin. Listeners must not drive engine transitions themselves.
pub trait StatusListener: Send + Sync {
    fn name(&self) -> &str;

    fn on_status_changed(&self, event: &StatusEvent, framework: &Framework) -> Result<(), EngineError>;
}

/// Adapter turning a closure into a [`StatusListener`]
pub struct FnListener<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a named status listener
pub fn listener_fn<F>(name: impl Into<String>, f: F) -> FnListener<F>
where
    F: Fn(&StatusEvent, &Framework) -> Result<(), EngineError> + Send + Sync,
{
    FnListener {
        name: name.into(),
        f,
    }
}

impl<F> StatusListener for FnListener<F>
where
    F: Fn(&StatusEvent, &Framework) -> Result<(), EngineError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_status_changed(&self, event: &StatusEvent, framework: &Framework) -> Result<(), EngineError> {
        (self.f)(event, framework)
    }
}
