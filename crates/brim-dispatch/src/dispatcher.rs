//! Dispatch entry point bridging the chat client layer to command handlers.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use brim_core::InvocationContext;

use crate::author_lock::AuthorLocks;

#[async_trait]
/// A command handler invocable by the dispatcher.
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the author is locked out of other commands while this one runs.
    fn locks_author(&self) -> bool {
        false
    }

    /// Whether this command needs the sidecar connection to be live.
    fn requires_sidecar(&self) -> bool {
        false
    }

    async fn invoke(&self, ctx: &InvocationContext) -> Result<()>;
}

/// Result of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    Failed { error: String },
    /// The author already has an invocation in flight; the message was
    /// silently dropped.
    DroppedBusy,
    /// The command needs the sidecar and no connection is live.
    SidecarUnavailable,
    UnknownCommand,
}

/// Routes parsed invocations to registered commands and enforces the
/// per-author lock around each one.
pub struct Dispatcher {
    commands: HashMap<String, Arc<dyn Command>>,
    locks: AuthorLocks,
    sidecar_available: Box<dyn Fn() -> bool + Send + Sync>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            locks: AuthorLocks::new(),
            sidecar_available: Box::new(|| false),
        }
    }

    /// Installs the probe consulted for commands that require the sidecar.
    pub fn with_sidecar_probe(
        mut self,
        probe: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.sidecar_available = Box::new(probe);
        self
    }

    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn locks(&self) -> &AuthorLocks {
        &self.locks
    }

    /// Dispatches one parsed invocation.
    ///
    /// A locked author is a silent no-op, not an error; the lock taken for
    /// opted-in commands is released whatever the invocation outcome.
    pub async fn dispatch(&self, name: &str, ctx: &InvocationContext) -> DispatchOutcome {
        if self.locks.is_locked(ctx.author.id) {
            tracing::debug!(
                author_id = ctx.author.id,
                command = name,
                "dropping invocation, author is locked"
            );
            return DispatchOutcome::DroppedBusy;
        }

        let Some(command) = self.commands.get(name) else {
            return DispatchOutcome::UnknownCommand;
        };

        if command.requires_sidecar() && !(self.sidecar_available)() {
            tracing::info!(
                command = name,
                "rejecting invocation, sidecar connection unavailable"
            );
            return DispatchOutcome::SidecarUnavailable;
        }

        // The early is_locked check only short-circuits; this acquisition is
        // the authoritative one and can still lose a race to another task.
        let _guard = if command.locks_author() {
            let Some(guard) = self.locks.try_guard(ctx) else {
                tracing::debug!(
                    author_id = ctx.author.id,
                    command = name,
                    "dropping invocation, author is locked"
                );
                return DispatchOutcome::DroppedBusy;
            };
            Some(guard)
        } else {
            None
        };

        tracing::info!(
            command = name,
            author = %ctx.author.tag(),
            "invoking command"
        );
        match command.invoke(ctx).await {
            Ok(()) => DispatchOutcome::Completed,
            Err(error) => {
                tracing::warn!(command = name, %error, "command invocation failed");
                DispatchOutcome::Failed {
                    error: error.to_string(),
                }
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
