use shared_crypto::PublicKey;
use shared_types::{
    var_bytes_size, var_string_size, BinaryReader, BinaryWriter, Fixed8, FormatError,
    Serializable, UInt160,
};

pub const FIELD_VOTES: &str = "Votes";
pub const FIELD_REGISTERED: &str = "Registered";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateType {
    Account = 0x40,
    Validator = 0x48,
}

/// One field change carried by a state transaction.
///
/// | Type | Key | Field | Value |
/// |------|-----|-------|-------|
/// | Account | 20-byte script hash | `Votes` | array of public keys |
/// | Validator | 33-byte public key | `Registered` | bool byte |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDescriptor {
    pub state_type: StateType,
    pub key: Vec<u8>,
    pub field: String,
    pub value: Vec<u8>,
}

impl StateDescriptor {
    /// Replace the vote list of `account`.
    pub fn votes(account: &UInt160, candidates: &[PublicKey]) -> Self {
        let mut writer = BinaryWriter::new();
        writer.write_serializable_array(candidates);
        Self {
            state_type: StateType::Account,
            key: account.to_vec(),
            field: FIELD_VOTES.to_string(),
            value: writer.into_bytes(),
        }
    }

    /// Register or unregister `validator`.
    pub fn registration(validator: &PublicKey, registered: bool) -> Self {
        Self {
            state_type: StateType::Validator,
            key: validator.as_bytes().to_vec(),
            field: FIELD_REGISTERED.to_string(),
            value: vec![u8::from(registered)],
        }
    }

    pub fn system_fee(&self, registration_fee: Fixed8) -> Fixed8 {
        match self.state_type {
            StateType::Validator if self.value.iter().any(|b| *b != 0) => registration_fee,
            _ => Fixed8::ZERO,
        }
    }

    pub fn account_hash(&self) -> Result<UInt160, FormatError> {
        UInt160::from_slice(&self.key)
    }

    pub fn validator_key(&self) -> Result<PublicKey, FormatError> {
        PublicKey::from_array(&self.key)
    }

    /// Decoded vote list of an account descriptor.
    pub fn vote_keys(&self, max: usize) -> Result<Vec<PublicKey>, FormatError> {
        BinaryReader::new(&self.value).read_serializable_array(max)
    }

    pub fn registered_flag(&self) -> bool {
        self.value.first().is_some_and(|b| *b != 0)
    }

    fn check(&self) -> Result<(), FormatError> {
        let (len, field) = match self.state_type {
            StateType::Account => (UInt160::LEN, FIELD_VOTES),
            StateType::Validator => (33, FIELD_REGISTERED),
        };
        if self.key.len() != len {
            return Err(FormatError::InvalidLength {
                expected: len,
                actual: self.key.len(),
            });
        }
        if self.field != field {
            return Err(FormatError::InvalidText(self.field.clone()));
        }
        Ok(())
    }
}

impl Serializable for StateDescriptor {
    fn size(&self) -> usize {
        1 + var_bytes_size(self.key.len())
            + var_string_size(&self.field)
            + var_bytes_size(self.value.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.state_type as u8);
        writer.write_var_bytes(&self.key);
        writer.write_var_string(&self.field);
        writer.write_var_bytes(&self.value);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let state_type = match reader.read_u8()? {
            0x40 => StateType::Account,
            0x48 => StateType::Validator,
            tag => {
                return Err(FormatError::InvalidTag {
                    kind: "state type",
                    tag,
                })
            }
        };
        let descriptor = Self {
            state_type,
            key: reader.read_var_bytes(100)?,
            field: reader.read_var_string(32)?,
            value: reader.read_var_bytes(65535)?,
        };
        descriptor.check()?;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::KeyPair;

    #[test]
    fn test_votes_descriptor() {
        let keys: Vec<_> = (1..=3u8)
            .map(|i| KeyPair::from_bytes([i; 32]).unwrap().public_key())
            .collect();
        let d = StateDescriptor::votes(&UInt160::from([7; 20]), &keys);
        let decoded = StateDescriptor::from_array(&d.to_array()).unwrap();
        assert_eq!(decoded.vote_keys(1024).unwrap(), keys);
        assert_eq!(decoded.account_hash().unwrap(), UInt160::from([7; 20]));
        assert_eq!(d.system_fee(Fixed8::ONE), Fixed8::ZERO);
    }

    #[test]
    fn test_registration_fee_only_when_registering() {
        let key = KeyPair::from_bytes([9; 32]).unwrap().public_key();
        let fee = Fixed8::from_raw(1000 * 100_000_000);
        assert_eq!(StateDescriptor::registration(&key, true).system_fee(fee), fee);
        assert_eq!(StateDescriptor::registration(&key, false).system_fee(fee), Fixed8::ZERO);
    }

    #[test]
    fn test_wrong_field_rejected() {
        let mut d = StateDescriptor::votes(&UInt160::ZERO, &[]);
        d.field = "Balance".to_string();
        assert!(StateDescriptor::from_array(&d.to_array()).is_err());
        let mut d = StateDescriptor::votes(&UInt160::ZERO, &[]);
        d.key.pop();
        assert!(matches!(
            StateDescriptor::from_array(&d.to_array()),
            Err(FormatError::InvalidLength { .. })
        ));
    }
}
