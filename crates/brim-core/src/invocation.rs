//! Invocation-context model: who triggered a command, and where.
//!
//! The chat client layer fills these in from its own cache; everything here is
//! plain identifiers so the sidecar bridge and dispatcher stay decoupled from
//! any particular client library.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRef {
    pub id: u64,
    pub name: String,
    pub discriminator: String,
}

impl AuthorRef {
    /// Full `name#discriminator` tag.
    pub fn tag(&self) -> String {
        format!("{}#{}", self.name, self.discriminator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: u64,
    /// Absent for direct-message channels, which have no server-side name.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRef {
    pub id: u64,
    pub name: String,
}

/// Where a command invocation originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub author: AuthorRef,
    pub channel: ChannelRef,
    pub guild: Option<GuildRef>,
    pub message_id: u64,
}

impl InvocationContext {
    /// Builds the correlation envelope the backend echoes back in replies.
    pub fn envelope(&self) -> ContextEnvelope {
        let channel_name = if self.guild.is_some() {
            self.channel.name.clone().unwrap_or_default()
        } else {
            format!("{}'s DM", self.author.tag())
        };
        ContextEnvelope {
            author: EnvelopeAuthor {
                name: self.author.name.clone(),
                discriminator: self.author.discriminator.clone(),
                id: self.author.id,
            },
            channel: EnvelopeChannel {
                name: channel_name,
                id: self.channel.id,
            },
            guild: self.guild.as_ref().map(|guild| EnvelopeGuild {
                name: guild.name.clone(),
                id: guild.id,
            }),
            message: EnvelopeMessage {
                id: self.message_id,
            },
        }
    }
}

/// Context envelope attached to context-carrying sidecar requests.
///
/// Serializes to the wire shape
/// `{author: {name, discriminator, id}, channel: {name, id},
/// guild: {name, id} | null, message: {id}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEnvelope {
    pub author: EnvelopeAuthor,
    pub channel: EnvelopeChannel,
    pub guild: Option<EnvelopeGuild>,
    pub message: EnvelopeMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeAuthor {
    pub name: String,
    pub discriminator: String,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeChannel {
    pub name: String,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeGuild {
    pub name: String,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    pub id: u64,
}
