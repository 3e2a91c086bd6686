//! Chat message types shared between the gateway and the backend connector.

use super::identifiers::{GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Messaging context of an envelope or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Direct,
    Group,
}

impl Scope {
    /// Get the scope name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a message is addressed. Direct and group targets are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Destination {
    User(UserId),
    Group(GroupId),
}

impl Destination {
    /// Scope implied by the destination.
    pub fn scope(&self) -> Scope {
        match self {
            Self::User(_) => Scope::Direct,
            Self::Group(_) => Scope::Group,
        }
    }

    /// Raw numeric id of the target.
    pub fn raw_id(&self) -> i64 {
        match self {
            Self::User(id) => id.get(),
            Self::Group(id) => id.get(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Group(id) => write!(f, "group:{}", id),
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    pub id: UserId,
    pub username: String,
}

/// A message the gateway is about to hand to the backend.
///
/// Fields are private: the only way to build one is with a resolved sender and
/// a validated destination, and nothing can change it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    sender: MessageSender,
    destination: Destination,
    body: String,
}

impl OutgoingMessage {
    /// Build an outgoing message.
    pub fn new(sender: MessageSender, destination: Destination, body: impl Into<String>) -> Self {
        Self {
            sender,
            destination,
            body: body.into(),
        }
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn scope(&self) -> Scope {
        self.destination.scope()
    }

    /// Turn the message into an envelope once the backend has accepted it.
    pub fn accepted(self, sent_at: DateTime<Utc>) -> MessageEnvelope {
        MessageEnvelope {
            sender: self.sender,
            destination: self.destination,
            body: self.body,
            sent_at,
        }
    }
}

/// One chat message in flight, as stored or pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub sender: MessageSender,
    pub destination: Destination,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Scope implied by the destination.
    pub fn scope(&self) -> Scope {
        self.destination.scope()
    }
}

/// Backend acknowledgment for a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendAck {
    pub delivered: bool,
    pub timestamp: DateTime<Utc>,
}
