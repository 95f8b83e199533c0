use shared_types::{
    var_bytes_size, BinaryReader, BinaryWriter, FormatError, Serializable, UInt160,
};

/// What an attribute's data means, keyed by its one-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeUsage {
    ContractHash,
    Ecdh02,
    Ecdh03,
    /// Extra script hash that must witness the transaction.
    Script,
    Vote,
    DescriptionUrl,
    Description,
    /// `Hash1`..`Hash15`.
    Hash(u8),
    /// `Remark`, `Remark1`..`Remark15`.
    Remark(u8),
}

impl AttributeUsage {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::ContractHash => 0x00,
            Self::Ecdh02 => 0x02,
            Self::Ecdh03 => 0x03,
            Self::Script => 0x20,
            Self::Vote => 0x30,
            Self::DescriptionUrl => 0x81,
            Self::Description => 0x90,
            Self::Hash(n) => 0xA0 + n,
            Self::Remark(n) => 0xF0 + n,
        }
    }

    pub fn from_byte(tag: u8) -> Result<Self, FormatError> {
        Ok(match tag {
            0x00 => Self::ContractHash,
            0x02 => Self::Ecdh02,
            0x03 => Self::Ecdh03,
            0x20 => Self::Script,
            0x30 => Self::Vote,
            0x81 => Self::DescriptionUrl,
            0x90 => Self::Description,
            0xA1..=0xAF => Self::Hash(tag - 0xA0),
            0xF0..=0xFF => Self::Remark(tag - 0xF0),
            _ => {
                return Err(FormatError::InvalidTag {
                    kind: "attribute usage",
                    tag,
                })
            }
        })
    }

    fn fixed_len(self) -> Option<usize> {
        match self {
            Self::ContractHash | Self::Vote | Self::Hash(_) | Self::Ecdh02 | Self::Ecdh03 => Some(32),
            Self::Script => Some(20),
            _ => None,
        }
    }

    pub fn is_ecdh(self) -> bool {
        matches!(self, Self::Ecdh02 | Self::Ecdh03)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionAttribute {
    pub usage: AttributeUsage,
    pub data: Vec<u8>,
}

impl TransactionAttribute {
    pub fn new(usage: AttributeUsage, data: Vec<u8>) -> Self {
        Self { usage, data }
    }

    /// Attribute requiring `hash` to witness the transaction.
    pub fn script(hash: &UInt160) -> Self {
        Self::new(AttributeUsage::Script, hash.to_vec())
    }

    /// Free-form remark, used to make otherwise identical transactions distinct.
    pub fn remark(text: &[u8]) -> Self {
        Self::new(AttributeUsage::Remark(0), text.to_vec())
    }
}

impl Serializable for TransactionAttribute {
    fn size(&self) -> usize {
        1 + match self.usage {
            AttributeUsage::DescriptionUrl => 1 + self.data.len(),
            AttributeUsage::Description | AttributeUsage::Remark(_) => var_bytes_size(self.data.len()),
            _ => self.data.len(),
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.usage.to_byte());
        match self.usage {
            AttributeUsage::DescriptionUrl => {
                writer.write_u8(self.data.len() as u8);
                writer.write_bytes(&self.data);
            }
            AttributeUsage::Description | AttributeUsage::Remark(_) => {
                writer.write_var_bytes(&self.data)
            }
            _ => writer.write_bytes(&self.data),
        }
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let usage = AttributeUsage::from_byte(reader.read_u8()?)?;
        let data = match usage.fixed_len() {
            Some(len) => reader.read_bytes(len)?.to_vec(),
            None => match usage {
                AttributeUsage::DescriptionUrl => {
                    let len = usize::from(reader.read_u8()?);
                    reader.read_bytes(len)?.to_vec()
                }
                _ => reader.read_var_bytes(usize::from(u16::MAX))?,
            },
        };
        Ok(Self { usage, data })
    }
}
