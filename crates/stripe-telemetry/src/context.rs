//! Per-invocation event context
//!
//! The context holds everything reported alongside an event for the lifetime
//! of one process run. Hosts with a single entry point can own an
//! [`EventContext`] and pass it by reference; hosts with several entry points
//! share the process-wide instance returned by [`global`].
//!
//! Fields are never reset between commands. A process that dispatches more
//! than one command keeps the previous values until they are rebound.

use serde::Serialize;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::command::CommandDescriptor;
use crate::invocation::new_identifier;

/// Fields reported with every telemetry event.
///
/// The serde names are the form keys used on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventContext {
    pub user_agent: String,
    pub invocation_id: String,
    pub command_path: String,
    pub merchant: String,
    pub cli_version: String,
    pub os: String,
    pub generated_resource: bool,
    pub request_id: String,
    #[serde(rename = "livemode")]
    pub live_mode: bool,
}

impl EventContext {
    /// Record the command being dispatched.
    ///
    /// Overwrites the path and generated flag from any earlier call.
    pub fn bind_command(&mut self, command: &CommandDescriptor) {
        self.command_path = command.path().to_string();
        self.generated_resource = command.kind().is_generated();
    }

    /// Mark this process run with a fresh invocation identifier
    pub fn assign_invocation_id(&mut self) {
        self.invocation_id = new_identifier();
    }
}

static GLOBAL: OnceLock<RwLock<EventContext>> = OnceLock::new();

/// The process-wide event context, created empty on first access.
///
/// Concurrent first calls initialize it exactly once; every call returns the
/// same instance.
pub fn global() -> &'static RwLock<EventContext> {
    GLOBAL.get_or_init(|| RwLock::new(EventContext::default()))
}

/// Copy of the process-wide context, suitable for handing to a sender
pub fn snapshot() -> EventContext {
    global()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Mutate the process-wide context
pub fn update<R>(f: impl FnOnce(&mut EventContext) -> R) -> R {
    let mut ctx = global().write().unwrap_or_else(PoisonError::into_inner);
    f(&mut ctx)
}
