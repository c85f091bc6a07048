//! Per-author mutual exclusion for command invocations.
//!
//! Not a contention mutex: a locked author's further commands are dropped as
//! busy no-ops rather than queued. Locks live only in process memory.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use brim_core::{current_unix_timestamp_ms, InvocationContext};

/// Record of the invocation currently holding an author's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedInvocation {
    pub message_id: u64,
    pub locked_unix_ms: u64,
}

/// Map from author id to their single in-flight invocation.
///
/// Owned by the dispatcher and passed around by handle; cloning shares the
/// same underlying map.
#[derive(Debug, Clone, Default)]
pub struct AuthorLocks {
    inner: Arc<Mutex<HashMap<u64, LockedInvocation>>>,
}

impl AuthorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `ctx` as the sole active invocation for its author.
    pub fn lock(&self, ctx: &InvocationContext) {
        let mut locked = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        locked.insert(
            ctx.author.id,
            LockedInvocation {
                message_id: ctx.message_id,
                locked_unix_ms: current_unix_timestamp_ms(),
            },
        );
    }

    /// Removes the author's lock unconditionally; a no-op when not held.
    pub fn unlock(&self, author_id: u64) {
        let mut locked = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        locked.remove(&author_id);
    }

    /// Whether the author currently has an invocation in flight.
    pub fn is_locked(&self, author_id: u64) -> bool {
        self.active(author_id).is_some()
    }

    /// The invocation currently holding the author's lock, if any.
    pub fn active(&self, author_id: u64) -> Option<LockedInvocation> {
        let locked = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        locked.get(&author_id).cloned()
    }

    /// Acquires the lock and returns a guard that releases it on drop, or
    /// `None` when the author already has an invocation in flight.
    ///
    /// Occupancy check and insert happen under one critical section, so two
    /// racing acquisitions for the same author can never both succeed.
    /// Dropping the guard covers every invocation outcome: normal return,
    /// error return, panic unwind, and future cancellation.
    pub fn try_guard(&self, ctx: &InvocationContext) -> Option<AuthorLockGuard> {
        let mut locked = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match locked.entry(ctx.author.id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(LockedInvocation {
                    message_id: ctx.message_id,
                    locked_unix_ms: current_unix_timestamp_ms(),
                });
                Some(AuthorLockGuard {
                    locks: self.clone(),
                    author_id: ctx.author.id,
                })
            }
        }
    }
}

/// Releases an author's lock when dropped.
#[derive(Debug)]
pub struct AuthorLockGuard {
    locks: AuthorLocks,
    author_id: u64,
}

impl Drop for AuthorLockGuard {
    fn drop(&mut self) {
        self.locks.unlock(self.author_id);
    }
}
