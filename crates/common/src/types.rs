use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an aggregate instance.
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// aggregate IDs with other UUID-based identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

/// Namespaces for aggregate IDs derived from external natural keys.
///
/// Products are keyed by SKU, payment records by the gateway order
/// reference, shipments by AWB and reviews by `(user, product)`. Deriving a
/// stable ID from those keys lets the event store's version check reject a
/// second stream for the same natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdNamespace {
    Product,
    Payment,
    Shipment,
    Review,
}

impl IdNamespace {
    fn uuid(self) -> Uuid {
        let label: &[u8] = match self {
            IdNamespace::Product => b"storefront/product",
            IdNamespace::Payment => b"storefront/payment",
            IdNamespace::Shipment => b"storefront/shipment",
            IdNamespace::Review => b"storefront/review",
        };
        Uuid::new_v5(&Uuid::NAMESPACE_OID, label)
    }
}

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a deterministic aggregate ID from a natural key.
    pub fn derived(namespace: IdNamespace, key: &str) -> Self {
        Self(Uuid::new_v5(&namespace.uuid(), key.as_bytes()))
    }

    /// Creates an aggregate ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AggregateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_id_new_creates_unique_ids() {
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn derived_ids_are_stable_per_key() {
        let a = AggregateId::derived(IdNamespace::Product, "ASHWA-100");
        let b = AggregateId::derived(IdNamespace::Product, "ASHWA-100");
        let c = AggregateId::derived(IdNamespace::Product, "TULSI-50");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn derived_ids_differ_across_namespaces() {
        let product = AggregateId::derived(IdNamespace::Product, "same-key");
        let shipment = AggregateId::derived(IdNamespace::Shipment, "same-key");
        assert_ne!(product, shipment);
    }

    #[test]
    fn aggregate_id_parses_from_string() {
        let id = AggregateId::new();
        let parsed: AggregateId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<AggregateId>().is_err());
    }

    #[test]
    fn aggregate_id_serialization_roundtrip() {
        let id = AggregateId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: AggregateId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
