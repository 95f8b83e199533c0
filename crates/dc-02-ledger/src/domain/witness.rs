use shared_crypto::script_hash;
use shared_types::{var_bytes_size, BinaryReader, BinaryWriter, FormatError, Serializable, UInt160};

/// Invocation script (pushes signatures) plus the verification script it
/// satisfies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Witness {
    pub invocation_script: Vec<u8>,
    pub verification_script: Vec<u8>,
}

impl Witness {
    pub const MAX_INVOCATION: usize = 65536;
    pub const MAX_VERIFICATION: usize = 65536;

    pub fn new(invocation_script: Vec<u8>, verification_script: Vec<u8>) -> Self {
        Self {
            invocation_script,
            verification_script,
        }
    }

    pub fn script_hash(&self) -> UInt160 {
        script_hash(&self.verification_script)
    }
}

impl Serializable for Witness {
    fn size(&self) -> usize {
        var_bytes_size(self.invocation_script.len()) + var_bytes_size(self.verification_script.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&self.invocation_script);
        writer.write_var_bytes(&self.verification_script);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            invocation_script: reader.read_var_bytes(Self::MAX_INVOCATION)?,
            verification_script: reader.read_var_bytes(Self::MAX_VERIFICATION)?,
        })
    }
}
