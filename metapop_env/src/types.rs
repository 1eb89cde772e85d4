//! Common types for the distributed graph substrate.

use serde::{Deserialize, Serialize};

/// Unique identifier for an agent (graph node).
///
/// Ids are allocated sequentially by the substrate, so they are stable
/// across relocations and identical on every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Identifier of a worker (its rank in the communicator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl WorkerId {
    /// The worker that builds the model and collects reductions.
    pub const ROOT: WorkerId = WorkerId(0);

    /// Returns the rank as a plain index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// Edge layer. Neighbor traversal is always scoped to one layer, so edges of
/// different kinds can never be confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u16);

/// Envelope for payloads exchanged between workers.
///
/// The payload is opaque bytes (JSON in practice) that the receiving side
/// deserializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Raw payload bytes
    pub payload: Vec<u8>,

    /// Worker that produced the envelope
    pub origin: WorkerId,
}

impl Envelope {
    /// Creates a new envelope from payload bytes.
    pub fn new(payload: Vec<u8>, origin: WorkerId) -> Self {
        Self { payload, origin }
    }

    /// Serializes `value` as JSON into a new envelope.
    pub fn from_json<T: Serialize>(value: &T, origin: WorkerId) -> Result<Self, crate::EnvError> {
        let payload = serde_json::to_vec(value).map_err(crate::EnvError::serialization)?;
        Ok(Self::new(payload, origin))
    }

    /// Deserializes the JSON payload.
    pub fn to_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, crate::EnvError> {
        serde_json::from_slice(&self.payload).map_err(crate::EnvError::serialization)
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_json_roundtrip() {
        let envelope = Envelope::from_json(&vec![1.5_f64, 2.5], WorkerId(3)).unwrap();
        assert_eq!(envelope.origin, WorkerId(3));
        assert!(envelope.size() > 0);

        let back: Vec<f64> = envelope.to_json().unwrap();
        assert_eq!(back, vec![1.5, 2.5]);
    }

    #[test]
    fn test_envelope_preserves_float_bits() {
        let values = vec![28264.96288342247_f64, 0.0004832571563375021, 1.7316274114011239, 0.1 + 0.2, 1.0 / 3.0];
        let back: Vec<f64> = Envelope::from_json(&values, WorkerId::ROOT).unwrap().to_json().unwrap();

        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&back), bits(&values));
    }

    #[test]
    fn test_envelope_bad_payload() {
        let envelope = Envelope::new(b"not json".to_vec(), WorkerId::ROOT);
        let result: Result<Vec<f64>, _> = envelope.to_json();
        assert!(result.is_err());
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(AgentId(7).to_string(), "agent#7");
        assert_eq!(WorkerId(2).to_string(), "worker#2");
        assert_eq!(WorkerId::ROOT.index(), 0);
    }
}
