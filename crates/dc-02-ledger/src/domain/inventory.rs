//! Relayable objects and the witness contract every one of them shares.

use super::errors::LedgerResult;
use super::witness::Witness;
use crate::snapshot::Snapshot;
use shared_crypto::{KeyPair, Signature};
use shared_types::{FormatError, UInt160, UInt256};

/// Kind tag used by `inv` and `getdata` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum InventoryType {
    Transaction = 0x01,
    Block = 0x02,
    Consensus = 0xE0,
}

impl InventoryType {
    pub fn from_byte(tag: u8) -> Result<Self, FormatError> {
        match tag {
            0x01 => Ok(Self::Transaction),
            0x02 => Ok(Self::Block),
            0xE0 => Ok(Self::Consensus),
            _ => Err(FormatError::InvalidTag {
                kind: "inventory type",
                tag,
            }),
        }
    }
}

/// An object authorized by witness scripts.
pub trait Verifiable {
    fn witnesses(&self) -> &[Witness];

    /// Unsigned serialization; the bytes signatures cover.
    fn hash_data(&self) -> Vec<u8>;

    /// Script hashes that must each be matched by one witness, in witness order.
    fn script_hashes_for_verifying(&self, snapshot: &Snapshot) -> LedgerResult<Vec<UInt160>>;
}

/// A verifiable object that travels by hash in `inv` announcements.
pub trait Inventory: Verifiable {
    fn hash(&self) -> UInt256;
    fn inventory_type(&self) -> InventoryType;
}

/// Sign the unsigned data of `verifiable` with `key`.
pub fn sign(verifiable: &dyn Verifiable, key: &KeyPair) -> Signature {
    key.sign(&verifiable.hash_data())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_type_tags() {
        for t in [InventoryType::Transaction, InventoryType::Block, InventoryType::Consensus] {
            assert_eq!(InventoryType::from_byte(t as u8).unwrap(), t);
        }
        assert!(InventoryType::from_byte(0x03).is_err());
    }
}
