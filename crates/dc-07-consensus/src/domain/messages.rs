//! Consensus messages carried in the `data` of a `ConsensusPayload`.
//!
//! ```text
//! ┌──────┬──────┬──────────────────────────────────────────────┐
//! │ type │ view │ body                                         │
//! │  u8  │  u8  │                                              │
//! └──────┴──────┴──────────────────────────────────────────────┘
//! 0x00 ChangeView       new_view: u8 (≥ 1)
//! 0x20 PrepareRequest   nonce: u64, next_consensus: UInt160,
//!                       hashes: [UInt256] (distinct), miner tx
//!                       (hash == hashes[0]), signature: 64 bytes
//! 0x21 PrepareResponse  signature: 64 bytes
//! ```

use dc_02_ledger::{Transaction, MAX_TRANSACTIONS_PER_BLOCK};
use shared_crypto::{Signature, SIGNATURE_LEN};
use shared_types::{
    array_size, BinaryReader, BinaryWriter, FormatError, Serializable, UInt160, UInt256,
};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    ChangeView = 0x00,
    PrepareRequest = 0x20,
    PrepareResponse = 0x21,
}

impl MessageType {
    pub fn from_byte(tag: u8) -> Result<Self, FormatError> {
        match tag {
            0x00 => Ok(Self::ChangeView),
            0x20 => Ok(Self::PrepareRequest),
            0x21 => Ok(Self::PrepareResponse),
            _ => Err(FormatError::InvalidTag {
                kind: "consensus message",
                tag,
            }),
        }
    }
}

/// The primary's proposal for the next block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    pub nonce: u64,
    pub next_consensus: UInt160,
    /// Miner transaction first.
    pub transaction_hashes: Vec<UInt256>,
    pub miner_transaction: Transaction,
    /// The primary's signature over the proposed header.
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    ChangeView { new_view_number: u8 },
    PrepareRequest(PrepareRequest),
    PrepareResponse { signature: Signature },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    pub view_number: u8,
    pub body: MessageBody,
}

impl ConsensusMessage {
    pub fn change_view(view_number: u8, new_view_number: u8) -> Self {
        Self {
            view_number,
            body: MessageBody::ChangeView { new_view_number },
        }
    }

    pub fn prepare_request(view_number: u8, request: PrepareRequest) -> Self {
        Self {
            view_number,
            body: MessageBody::PrepareRequest(request),
        }
    }

    pub fn prepare_response(view_number: u8, signature: Signature) -> Self {
        Self {
            view_number,
            body: MessageBody::PrepareResponse { signature },
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self.body {
            MessageBody::ChangeView { .. } => MessageType::ChangeView,
            MessageBody::PrepareRequest(_) => MessageType::PrepareRequest,
            MessageBody::PrepareResponse { .. } => MessageType::PrepareResponse,
        }
    }
}

fn read_signature(reader: &mut BinaryReader<'_>) -> Result<Signature, FormatError> {
    let bytes = reader.read_bytes(SIGNATURE_LEN)?;
    Signature::from_slice(bytes).map_err(|_| FormatError::InvalidLength {
        expected: SIGNATURE_LEN,
        actual: bytes.len(),
    })
}

impl Serializable for ConsensusMessage {
    fn size(&self) -> usize {
        2 + match &self.body {
            MessageBody::ChangeView { .. } => 1,
            MessageBody::PrepareRequest(request) => {
                8 + UInt160::LEN
                    + array_size(&request.transaction_hashes)
                    + request.miner_transaction.size()
                    + SIGNATURE_LEN
            }
            MessageBody::PrepareResponse { .. } => SIGNATURE_LEN,
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.message_type() as u8);
        writer.write_u8(self.view_number);
        match &self.body {
            MessageBody::ChangeView { new_view_number } => writer.write_u8(*new_view_number),
            MessageBody::PrepareRequest(request) => {
                writer.write_u64(request.nonce);
                request.next_consensus.serialize(writer);
                writer.write_serializable_array(&request.transaction_hashes);
                request.miner_transaction.serialize(writer);
                writer.write_bytes(request.signature.as_bytes());
            }
            MessageBody::PrepareResponse { signature } => writer.write_bytes(signature.as_bytes()),
        }
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let message_type = MessageType::from_byte(reader.read_u8()?)?;
        let view_number = reader.read_u8()?;
        let body = match message_type {
            MessageType::ChangeView => {
                let new_view_number = reader.read_u8()?;
                if new_view_number == 0 {
                    return Err(FormatError::invalid("change view to view 0"));
                }
                MessageBody::ChangeView { new_view_number }
            }
            MessageType::PrepareRequest => {
                let nonce = reader.read_u64()?;
                let next_consensus = UInt160::deserialize(reader)?;
                let transaction_hashes: Vec<UInt256> =
                    reader.read_serializable_array(MAX_TRANSACTIONS_PER_BLOCK)?;
                let distinct: HashSet<&UInt256> = transaction_hashes.iter().collect();
                if distinct.len() != transaction_hashes.len() {
                    return Err(FormatError::invalid("duplicate transaction hashes"));
                }
                let miner_transaction = Transaction::deserialize(reader)?;
                if !miner_transaction.is_miner() {
                    return Err(FormatError::invalid("proposal without a miner transaction"));
                }
                if transaction_hashes.first() != Some(&miner_transaction.hash()) {
                    return Err(FormatError::invalid(
                        "miner transaction does not match the first hash",
                    ));
                }
                let signature = read_signature(reader)?;
                MessageBody::PrepareRequest(PrepareRequest {
                    nonce,
                    next_consensus,
                    transaction_hashes,
                    miner_transaction,
                    signature,
                })
            }
            MessageType::PrepareResponse => MessageBody::PrepareResponse {
                signature: read_signature(reader)?,
            },
        };
        Ok(Self { view_number, body })
    }
}
