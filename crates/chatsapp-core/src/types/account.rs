//! Account identity and roster types.

use super::identifiers::{GroupId, UserId};
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};

/// Authenticated identity returned by the account service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
}

/// A user the account may chat with directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
}

/// A group the account belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub name: String,
}

/// Contacts and groups cached with a session, in backend order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub contacts: Vec<Contact>,

    #[serde(default)]
    pub groups: Vec<GroupSummary>,
}

impl Roster {
    /// Check whether a user is among the cached contacts.
    pub fn has_contact(&self, user_id: UserId) -> bool {
        self.contacts.iter().any(|c| c.user_id == user_id)
    }

    /// Check whether a group is among the cached groups.
    pub fn has_group(&self, group_id: GroupId) -> bool {
        self.groups.iter().any(|g| g.group_id == group_id)
    }
}

/// Registration request forwarded to the account service.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub display_name: String,
    pub password: SecretString,
}

/// Login request forwarded to the account service.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Successful login result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub identity: Identity,
    pub roster: Roster,
}
