// SPDX-License-Identifier: MPL-2.0
//! Process-wide panic hook with an ordered handler list.
//!
//! The standard library allows exactly one panic hook. This module installs it
//! once and fans every panic out to the registered handlers in registration
//! order, then to whatever hook was installed before (usually the default one
//! that prints the message). Handlers are removed when their
//! [`PanicHookRegistration`] is dropped.
//!
//! A handler that panics itself aborts the process, as with any panic hook.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, Once, OnceLock};

use parking_lot::Mutex;

/// Facts about one panic, handed to every handler.
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub message: String,
    /// `file:line:column` of the panic site, when known.
    pub location: Option<String>,
    pub thread: Option<String>,
    /// Present only when backtraces are enabled (`RUST_BACKTRACE`).
    pub backtrace: Option<String>,
}

impl PanicReport {
    fn from_info(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());

        let backtrace = Backtrace::capture();
        let backtrace =
            (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());

        Self {
            message,
            location: info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column())),
            thread: std::thread::current().name().map(str::to_string),
            backtrace,
        }
    }
}

type Handler = Arc<dyn Fn(&PanicReport) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(Mutex::default)
}

fn install() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let report = PanicReport::from_info(info);
            // Clone out so handlers run without the registry lock held.
            let handlers: Vec<Handler> = registry()
                .lock()
                .handlers
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect();
            for handler in handlers {
                handler(&report);
            }
            previous(info);
        }));
    });
}

/// Adds `handler` to the panic hook, installing the hook on first use.
pub fn register(handler: impl Fn(&PanicReport) + Send + Sync + 'static) -> PanicHookRegistration {
    install();
    let mut registry = registry().lock();
    let id = registry.next_id;
    registry.next_id += 1;
    registry.handlers.push((id, Arc::new(handler)));
    PanicHookRegistration { id }
}

/// Keeps a handler registered until dropped.
#[derive(Debug)]
#[must_use = "the handler is removed when the registration is dropped"]
pub struct PanicHookRegistration {
    id: u64,
}

impl Drop for PanicHookRegistration {
    fn drop(&mut self) {
        registry().lock().handlers.retain(|(id, _)| *id != self.id);
    }
}
