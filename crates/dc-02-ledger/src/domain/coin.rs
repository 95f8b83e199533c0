use shared_types::{
    BinaryReader, BinaryWriter, Fixed8, FormatError, Serializable, UInt160, UInt256,
};

/// Pointer to an output of an earlier transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoinReference {
    pub prev_hash: UInt256,
    pub prev_index: u16,
}

impl CoinReference {
    pub fn new(prev_hash: UInt256, prev_index: u16) -> Self {
        Self {
            prev_hash,
            prev_index,
        }
    }
}

impl Serializable for CoinReference {
    fn size(&self) -> usize {
        UInt256::LEN + 2
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.prev_hash.serialize(writer);
        writer.write_u16(self.prev_index);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            prev_hash: reader.read_serializable()?,
            prev_index: reader.read_u16()?,
        })
    }
}

/// Amount of an asset locked to a script hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub asset_id: UInt256,
    pub value: Fixed8,
    pub script_hash: UInt160,
}

impl TransactionOutput {
    pub fn new(asset_id: UInt256, value: Fixed8, script_hash: UInt160) -> Self {
        Self {
            asset_id,
            value,
            script_hash,
        }
    }
}

impl Serializable for TransactionOutput {
    fn size(&self) -> usize {
        UInt256::LEN + 8 + UInt160::LEN
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.asset_id.serialize(writer);
        self.value.serialize(writer);
        self.script_hash.serialize(writer);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let asset_id = reader.read_serializable()?;
        let value: Fixed8 = reader.read_serializable()?;
        if !value.is_positive() {
            return Err(FormatError::invalid("output value must be positive"));
        }
        Ok(Self {
            asset_id,
            value,
            script_hash: reader.read_serializable()?,
        })
    }
}
