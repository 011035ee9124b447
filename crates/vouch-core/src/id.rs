//! Typed identifiers for escrow entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique escrow transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Create a new random transaction ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("txn-{}", Uuid::new_v4()))
    }

    /// Create from a string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique dispute case identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisputeId(String);

impl DisputeId {
    /// Create a new random dispute ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("dsp-{}", Uuid::new_v4()))
    }

    /// Create from a string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DisputeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DisputeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a marketplace participant (buyer or seller account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId(String);

impl PartyId {
    /// Create a party ID from an account reference.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ids_are_unique() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("txn-"));
    }

    #[test]
    fn dispute_ids_are_unique() {
        let id1 = DisputeId::new();
        let id2 = DisputeId::new();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("dsp-"));
    }

    #[test]
    fn from_string_roundtrip() {
        let id = TransactionId::from_string("txn-fixed");
        assert_eq!(id.as_str(), "txn-fixed");
        assert_eq!(id.to_string(), "txn-fixed");
    }

    #[test]
    fn party_id_display() {
        let id = PartyId::new("buyer-1");
        assert_eq!(id.to_string(), "buyer-1");
    }

    #[test]
    fn id_serialization_roundtrip() {
        let id = DisputeId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: DisputeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
