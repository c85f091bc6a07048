//! Foundational types shared across brim crates.
//!
//! Provides time helpers plus the invocation-context model describing where a
//! command was triggered, which the sidecar bridge echoes for correlation.

pub mod invocation;
pub mod time_utils;

pub use invocation::{
    AuthorRef, ChannelRef, ContextEnvelope, GuildRef, InvocationContext,
};
pub use time_utils::{current_unix_timestamp_ms, current_unix_timestamp_secs};
