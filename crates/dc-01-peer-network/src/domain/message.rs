//! # Wire Framing
//!
//! ```text
//! ┌────────┬────────────────┬────────┬──────────┬───────────┐
//! │ magic  │ command        │ length │ checksum │ payload   │
//! │ u32 LE │ 12 B, NUL pad  │ u32 LE │ u32 LE   │ length B  │
//! └────────┴────────────────┴────────┴──────────┴───────────┘
//! ```
//!
//! The checksum is the first four bytes of the double SHA-256 of the
//! payload. Magic is checked before the length is trusted and the checksum
//! before the payload is parsed.

use super::errors::{NetworkError, NetworkResult};
use shared_crypto::checksum;
use shared_types::{BinaryReader, BinaryWriter, FormatError, Serializable};

pub const HEADER_SIZE: usize = 24;
pub const COMMAND_SIZE: usize = 12;
pub const MAX_PAYLOAD_SIZE: usize = 0x0200_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Version,
    Verack,
    GetAddr,
    Addr,
    GetBlocks,
    GetHeaders,
    Headers,
    Inv,
    GetData,
    NotFound,
    Tx,
    Block,
    Consensus,
    MemPool,
    FilterLoad,
    FilterAdd,
    FilterClear,
    MerkleBlock,
    Alert,
}

impl Command {
    pub const ALL: [Command; 19] = [
        Command::Version,
        Command::Verack,
        Command::GetAddr,
        Command::Addr,
        Command::GetBlocks,
        Command::GetHeaders,
        Command::Headers,
        Command::Inv,
        Command::GetData,
        Command::NotFound,
        Command::Tx,
        Command::Block,
        Command::Consensus,
        Command::MemPool,
        Command::FilterLoad,
        Command::FilterAdd,
        Command::FilterClear,
        Command::MerkleBlock,
        Command::Alert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Verack => "verack",
            Self::GetAddr => "getaddr",
            Self::Addr => "addr",
            Self::GetBlocks => "getblocks",
            Self::GetHeaders => "getheaders",
            Self::Headers => "headers",
            Self::Inv => "inv",
            Self::GetData => "getdata",
            Self::NotFound => "notfound",
            Self::Tx => "tx",
            Self::Block => "block",
            Self::Consensus => "consensus",
            Self::MemPool => "mempool",
            Self::FilterLoad => "filterload",
            Self::FilterAdd => "filteradd",
            Self::FilterClear => "filterclear",
            Self::MerkleBlock => "merkleblock",
            Self::Alert => "alert",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == name)
    }

    /// Control traffic, sent ahead of everything else.
    pub fn is_high_priority(self) -> bool {
        matches!(
            self,
            Self::Alert
                | Self::Consensus
                | Self::FilterAdd
                | Self::FilterClear
                | Self::FilterLoad
                | Self::GetAddr
                | Self::MemPool
        )
    }

    /// At most one copy of these may wait in a queue.
    pub fn is_single(self) -> bool {
        matches!(
            self,
            Self::Addr | Self::GetAddr | Self::GetBlocks | Self::GetHeaders | Self::MemPool
        )
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame header whose magic matched and whose length is in bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub command: String,
    pub length: usize,
    pub checksum: u32,
}

impl MessageHeader {
    pub fn decode(bytes: &[u8; HEADER_SIZE], magic: u32) -> NetworkResult<Self> {
        let mut reader = BinaryReader::new(bytes);
        let actual = reader.read_u32()?;
        if actual != magic {
            return Err(NetworkError::MagicMismatch {
                expected: magic,
                actual,
            });
        }
        let command = reader.read_fixed_string(COMMAND_SIZE)?;
        let length = reader.read_u32()? as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(NetworkError::PayloadTooLarge(length));
        }
        Ok(Self {
            command,
            length,
            checksum: reader.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new<T: Serializable>(command: Command, payload: &T) -> Self {
        Self {
            command,
            payload: payload.to_array(),
        }
    }

    pub fn empty(command: Command) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Parse the payload as `T`.
    pub fn payload_as<T: Serializable>(&self) -> NetworkResult<T> {
        Ok(T::from_array(&self.payload)?)
    }

    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self, magic: u32) -> NetworkResult<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(NetworkError::PayloadTooLarge(self.payload.len()));
        }
        let mut writer = BinaryWriter::with_capacity(self.size());
        writer.write_u32(magic);
        writer.write_fixed_string(self.command.as_str(), COMMAND_SIZE)?;
        writer.write_u32(self.payload.len() as u32);
        writer.write_u32(checksum(&self.payload));
        writer.write_bytes(&self.payload);
        Ok(writer.into_bytes())
    }

    /// Pair a decoded header with its payload bytes.
    pub fn from_parts(header: MessageHeader, payload: Vec<u8>) -> NetworkResult<Self> {
        if payload.len() != header.length {
            return Err(FormatError::InvalidLength {
                expected: header.length,
                actual: payload.len(),
            }
            .into());
        }
        if checksum(&payload) != header.checksum {
            return Err(NetworkError::ChecksumMismatch);
        }
        let command = Command::parse(&header.command)
            .ok_or(NetworkError::UnknownCommand(header.command))?;
        Ok(Self { command, payload })
    }

    /// Decode one complete frame.
    pub fn decode(bytes: &[u8], magic: u32) -> NetworkResult<Self> {
        let Some((head, payload)) = bytes.split_first_chunk::<HEADER_SIZE>() else {
            return Err(FormatError::UnexpectedEof {
                needed: HEADER_SIZE,
                available: bytes.len(),
            }
            .into());
        };
        let header = MessageHeader::decode(head, magic)?;
        Self::from_parts(header, payload.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAGIC: u32 = 0x0074_6E41;

    #[test]
    fn test_command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::parse(command.as_str()), Some(command));
            assert!(command.as_str().len() <= COMMAND_SIZE);
        }
        assert_eq!(Command::parse("ping"), None);
    }

    #[test]
    fn test_queue_classes() {
        assert!(Command::Consensus.is_high_priority());
        assert!(!Command::Inv.is_high_priority());
        assert!(Command::GetBlocks.is_single());
        assert!(!Command::Tx.is_single());
    }

    #[test]
    fn test_header_layout() {
        let message = Message {
            command: Command::Inv,
            payload: vec![1, 2, 3],
        };
        let bytes = message.encode(MAGIC).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 3);
        assert_eq!(&bytes[..4], &MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..7], b"inv");
        assert!(bytes[7..16].iter().all(|b| *b == 0));
        assert_eq!(&bytes[16..20], &3u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &checksum(&[1, 2, 3]).to_le_bytes());
        assert_eq!(Message::decode(&bytes, MAGIC).unwrap(), message);
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let bytes = Message::empty(Command::Verack).encode(MAGIC).unwrap();
        assert!(matches!(
            Message::decode(&bytes, MAGIC + 1),
            Err(NetworkError::MagicMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_length_rejected_before_payload() {
        let mut bytes = Message::empty(Command::Block).encode(MAGIC).unwrap();
        bytes[16..20].copy_from_slice(&(MAX_PAYLOAD_SIZE as u32 + 1).to_le_bytes());
        let head: [u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().unwrap();
        assert!(matches!(
            MessageHeader::decode(&head, MAGIC),
            Err(NetworkError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_unknown_command_is_not_fatal() {
        let payload = vec![7u8; 5];
        let mut writer = BinaryWriter::new();
        writer.write_u32(MAGIC);
        writer.write_fixed_string("ping", COMMAND_SIZE).unwrap();
        writer.write_u32(payload.len() as u32);
        writer.write_u32(checksum(&payload));
        writer.write_bytes(&payload);
        let error = Message::decode(writer.as_slice(), MAGIC).unwrap_err();
        assert!(matches!(error, NetworkError::UnknownCommand(ref name) if name == "ping"));
        assert!(!error.is_fatal());
    }

    proptest! {
        #[test]
        fn test_bit_flip_is_caught_by_the_field_it_lands_in(
            payload in prop::collection::vec(any::<u8>(), 1..64),
            bit in any::<prop::sample::Index>(),
        ) {
            let message = Message { command: Command::Tx, payload };
            let mut bytes = message.encode(MAGIC).unwrap();
            let bit = bit.index(bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);
            let decoded = Message::decode(&bytes, MAGIC);
            match bit / 8 {
                0..=3 => {
                    prop_assert!(
                        matches!(decoded, Err(NetworkError::MagicMismatch { .. })),
                        "magic flip gave {:?}", decoded
                    );
                }
                // the command name may still parse, but never with a different payload
                4..=15 => match decoded {
                    Ok(decoded) => {
                        prop_assert_eq!(decoded.payload, message.payload);
                    }
                    Err(error) => {
                        prop_assert!(
                            matches!(error, NetworkError::UnknownCommand(_) | NetworkError::Format(_)),
                            "command flip gave {:?}", error
                        );
                    }
                },
                16..=19 => {
                    prop_assert!(
                        matches!(
                            decoded,
                            Err(NetworkError::PayloadTooLarge(_) | NetworkError::Format(_))
                        ),
                        "length flip gave {:?}", decoded
                    );
                }
                _ => {
                    prop_assert!(
                        matches!(decoded, Err(NetworkError::ChecksumMismatch)),
                        "checksum or payload flip gave {:?}", decoded
                    );
                }
            }
        }
    }
}
