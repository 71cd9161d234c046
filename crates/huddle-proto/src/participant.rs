//! Participant identity types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned by the directory.
///
/// Uniqueness is the directory's responsibility. The room protocol only ever
/// compares identifiers for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Role of a participant inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Authoritative relay and sole roster writer.
    Host,
    /// Any other participant.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// A room member as seen in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Directory-assigned identifier.
    pub identifier: PeerId,
    /// Role in the room.
    pub role: Role,
}

impl Participant {
    /// Participant with [`Role::Host`].
    pub fn host(identifier: PeerId) -> Self {
        Self { identifier, role: Role::Host }
    }

    /// Participant with [`Role::Client`].
    pub fn client(identifier: PeerId) -> Self {
        Self { identifier, role: Role::Client }
    }

    /// True if this participant is the host.
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display_is_raw_string() {
        let id = PeerId::from("10.0.0.7:7000");
        assert_eq!(id.to_string(), "10.0.0.7:7000");
        assert_eq!(id.as_str(), "10.0.0.7:7000");
    }

    #[test]
    fn participant_constructors_set_role() {
        assert!(Participant::host(PeerId::from("a")).is_host());
        assert!(!Participant::client(PeerId::from("b")).is_host());
    }
}
