//! Record-data (acyclic parameter) request types.
//!
//! A record request addresses one sub-device by `(identifier, hardware_id)`.
//! The pair is folded into a 32-bit [`SubscriptionKey`]:
//!
//! ```text
//!  31            16 15             0
//! ┌────────────────┬────────────────┐
//! │   identifier   │  hardware_id   │
//! └────────────────┴────────────────┘
//! ```

use std::fmt;

/// Composite key `hardware_id | (identifier << 16)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey(u32);

impl SubscriptionKey {
    /// Fold both 16-bit ids into one key.
    pub const fn new(identifier: u16, hardware_id: u16) -> Self {
        Self((hardware_id as u32) | ((identifier as u32) << 16))
    }

    /// Build a key from a wire identifier, rejecting values above 16 bits.
    pub fn from_wire(identifier: u32, hardware_id: u16) -> Option<Self> {
        u16::try_from(identifier)
            .ok()
            .map(|id| Self::new(id, hardware_id))
    }

    /// Upper half.
    pub const fn identifier(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Lower half.
    pub const fn hardware_id(self) -> u16 {
        self.0 as u16
    }

    /// Raw 32-bit value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.identifier(), self.hardware_id())
    }
}

/// A parameter read or write issued by the controller side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDataRequest {
    /// Sub-device identifier.
    pub identifier: u16,
    /// Hardware id of the addressed module.
    pub hardware_id: u16,
    /// Record index.
    pub index: u16,
    /// Declared record length in bytes.
    pub length: u32,
    /// Payload of a write; `None` for reads.
    pub data: Option<Vec<u8>>,
}

impl RecordDataRequest {
    /// Read request for `length` bytes of record `index`.
    pub fn read(identifier: u16, hardware_id: u16, index: u16, length: u32) -> Self {
        Self {
            identifier,
            hardware_id,
            index,
            length,
            data: None,
        }
    }

    /// Write request; `length` is taken from `data`.
    pub fn write(identifier: u16, hardware_id: u16, index: u16, data: Vec<u8>) -> Self {
        Self {
            identifier,
            hardware_id,
            index,
            length: data.len() as u32,
            data: Some(data),
        }
    }

    /// Queue key of this request.
    pub const fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.identifier, self.hardware_id)
    }

    /// A write is deliverable only if its data matches the declared length.
    pub fn has_consistent_data(&self) -> bool {
        self.data
            .as_ref()
            .is_some_and(|d| d.len() as u64 == u64::from(self.length))
    }
}

/// Completion notification emitted when the peer reports a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    /// A read finished; `data` holds the record contents.
    ReadCompleted {
        /// Addressed sub-device.
        key: SubscriptionKey,
        /// Record index.
        index: u16,
        /// Delivered bytes.
        data: Vec<u8>,
    },
    /// A write finished.
    WriteCompleted {
        /// Addressed sub-device.
        key: SubscriptionKey,
        /// Record index.
        index: u16,
        /// Length acknowledged by the peer.
        length: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_folds_identifier_into_upper_half() {
        let key = SubscriptionKey::new(0x0102, 0x0304);
        assert_eq!(key.raw(), 0x0102_0304);
        assert_eq!(key.identifier(), 0x0102);
        assert_eq!(key.hardware_id(), 0x0304);
        assert_eq!(key.to_string(), "258:772");
    }

    #[test]
    fn wire_identifier_must_fit_sixteen_bits() {
        assert!(SubscriptionKey::from_wire(0xFFFF, 1).is_some());
        assert!(SubscriptionKey::from_wire(0x1_0000, 1).is_none());
    }

    #[test]
    fn write_request_consistency() {
        let req = RecordDataRequest::write(1, 2, 3, vec![1, 2, 3]);
        assert_eq!(req.length, 3);
        assert!(req.has_consistent_data());

        let mut bad = req.clone();
        bad.length = 4;
        assert!(!bad.has_consistent_data());
        assert!(!RecordDataRequest::read(1, 2, 3, 4).has_consistent_data());
    }
}
