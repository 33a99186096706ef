use super::local::{ExceptionHandler, LocalLoop};
use super::scheduler::ErrorContext;

use std::env;
use std::rc::Rc;

/// Environment variable turning debug mode on by default.
const DEBUG_ENV: &str = "ORBIS_DEBUG";

/// Builder for configuring and creating a loop.
///
/// `LoopBuilder` allows customizing loop parameters before constructing
/// it: debug mode, and the handler receiving errors nobody else observes.
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = LoopBuilder::new()
///     .debug(true)
///     .exception_handler(|context| eprintln!("{context}"))
///     .build();
/// ```
pub struct LoopBuilder {
    /// Whether new futures capture the backtrace of their creation.
    debug: bool,

    exception_handler: Option<ExceptionHandler>,
}

impl LoopBuilder {
    /// Creates a new `LoopBuilder` with default configuration.
    ///
    /// Debug mode is enabled when `ORBIS_DEBUG` is set to anything other
    /// than an empty string or `0`. Errors are logged with `log::error!`.
    pub fn new() -> Self {
        let debug = env::var(DEBUG_ENV)
            .map(|value| !value.is_empty() && value != "0")
            .unwrap_or(false);

        Self {
            debug,
            exception_handler: None,
        }
    }

    /// Enables or disables debug mode.
    ///
    /// In debug mode every future records where it was created, and that
    /// backtrace is attached to the diagnostics reported about it.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Sets the handler receiving unretrieved errors, pending tasks being
    /// destroyed, and errors returned by callbacks.
    pub fn exception_handler<H>(mut self, handler: H) -> Self
    where
        H: Fn(&ErrorContext) + 'static,
    {
        self.exception_handler = Some(Box::new(handler));
        self
    }

    /// Builds the loop with the configured options.
    pub fn build(self) -> Rc<LocalLoop> {
        log::debug!("building loop (debug: {})", self.debug);
        Rc::new(LocalLoop::with_config(self.debug, self.exception_handler))
    }
}

impl Default for LoopBuilder {
    /// Creates a default `LoopBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
