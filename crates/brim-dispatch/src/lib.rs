//! Command dispatch glue: per-author invocation locking and the hooks that
//! guarantee a lock never outlives its invocation.
//!
//! The chat client layer parses messages into a command name plus an
//! [`InvocationContext`](brim_core::InvocationContext) and hands them to
//! [`Dispatcher::dispatch`]; everything upstream of that seam is out of scope
//! here.

pub mod author_lock;
pub mod dispatcher;

pub use author_lock::{AuthorLockGuard, AuthorLocks, LockedInvocation};
pub use dispatcher::{Command, DispatchOutcome, Dispatcher};
