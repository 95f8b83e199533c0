//! # Stored State Records
//!
//! Every record starts with a state version byte (currently 0); a record
//! with any other version is rejected.
//!
//! | Prefix | Key | Record |
//! |--------|-----|--------|
//! | `0x01` | block hash | [`BlockState`] |
//! | `0x02` | tx hash | [`TransactionState`] |
//! | `0x40` | script hash | [`AccountState`] |
//! | `0x44` | tx hash | [`UnspentCoinState`] |
//! | `0x45` | tx hash | [`SpentCoinState`] |
//! | `0x48` | public key | [`ValidatorState`] |
//! | `0x4c` | asset id | [`AssetState`] |
//! | `0x50` | script hash | [`ContractState`] |
//! | `0x70` | [`StorageKey`] | [`StorageItem`] |
//! | `0x80` | [`HeightKey`] | [`HeaderHashList`] |
//! | `0x90` | none | [`ValidatorsCountState`] |
//! | `0xc0` / `0xc1` | none | [`HashIndexState`] (current block / header) |

use super::block::TrimmedBlock;
use super::transaction::Transaction;
use shared_crypto::{script_hash, PublicKey};
use shared_types::{
    array_size, var_bytes_size, var_int_size, var_string_size, BinaryReader, BinaryWriter, Fixed8,
    FormatError, Serializable, UInt160, UInt256,
};
use std::collections::BTreeMap;

const STATE_VERSION: u8 = 0;

fn read_version(reader: &mut BinaryReader<'_>) -> Result<(), FormatError> {
    match reader.read_u8()? {
        STATE_VERSION => Ok(()),
        tag => Err(FormatError::InvalidTag {
            kind: "state version",
            tag,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AssetType {
    GoverningToken = 0x00,
    UtilityToken = 0x01,
    Currency = 0x08,
    CreditFlag = 0x40,
    Token = 0x60,
    DutyFlag = 0x80,
    Share = 0x90,
    Invoice = 0x98,
}

impl AssetType {
    pub fn from_byte(tag: u8) -> Result<Self, FormatError> {
        Ok(match tag {
            0x00 => Self::GoverningToken,
            0x01 => Self::UtilityToken,
            0x08 => Self::Currency,
            0x40 => Self::CreditFlag,
            0x60 => Self::Token,
            0x80 => Self::DutyFlag,
            0x90 => Self::Share,
            0x98 => Self::Invoice,
            _ => {
                return Err(FormatError::InvalidTag {
                    kind: "asset type",
                    tag,
                })
            }
        })
    }

    /// Receivers of a duty-flagged asset must sign the transaction.
    pub fn has_duty_flag(self) -> bool {
        (self as u8) & (Self::DutyFlag as u8) != 0
    }

    pub fn is_native(self) -> bool {
        matches!(self, Self::GoverningToken | Self::UtilityToken)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub script_hash: UInt160,
    pub is_frozen: bool,
    pub votes: Vec<PublicKey>,
    pub balances: BTreeMap<UInt256, Fixed8>,
}

impl AccountState {
    pub fn new(script_hash: UInt160) -> Self {
        Self {
            script_hash,
            is_frozen: false,
            votes: Vec::new(),
            balances: BTreeMap::new(),
        }
    }

    pub fn balance(&self, asset_id: &UInt256) -> Fixed8 {
        self.balances.get(asset_id).copied().unwrap_or(Fixed8::ZERO)
    }
}

impl Serializable for AccountState {
    fn size(&self) -> usize {
        1 + UInt160::LEN
            + 1
            + array_size(&self.votes)
            + var_int_size(self.balances.len() as u64)
            + self.balances.len() * (UInt256::LEN + 8)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        self.script_hash.serialize(writer);
        writer.write_bool(self.is_frozen);
        writer.write_serializable_array(&self.votes);
        writer.write_var_int(self.balances.len() as u64);
        for (asset, value) in &self.balances {
            asset.serialize(writer);
            value.serialize(writer);
        }
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        let script_hash = reader.read_serializable()?;
        let is_frozen = reader.read_bool()?;
        let votes = reader.read_serializable_array(1024)?;
        let count = reader.read_var_int(u64::from(u32::MAX))?;
        let mut balances = BTreeMap::new();
        for _ in 0..count {
            let asset: UInt256 = reader.read_serializable()?;
            let value: Fixed8 = reader.read_serializable()?;
            balances.insert(asset, value);
        }
        Ok(Self {
            script_hash,
            is_frozen,
            votes,
            balances,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorState {
    pub public_key: PublicKey,
    pub registered: bool,
    pub votes: Fixed8,
}

impl ValidatorState {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            registered: false,
            votes: Fixed8::ZERO,
        }
    }
}

impl Serializable for ValidatorState {
    fn size(&self) -> usize {
        1 + 33 + 1 + 8
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        self.public_key.serialize(writer);
        writer.write_bool(self.registered);
        self.votes.serialize(writer);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            public_key: reader.read_serializable()?,
            registered: reader.read_bool()?,
            votes: reader.read_serializable()?,
        })
    }
}

/// Registered asset. `owner` is `None` for the native tokens, encoded as
/// the single byte `0x00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetState {
    pub asset_id: UInt256,
    pub asset_type: AssetType,
    pub name: String,
    pub amount: Fixed8,
    pub available: Fixed8,
    pub precision: u8,
    pub fee: Fixed8,
    pub fee_address: UInt160,
    pub owner: Option<PublicKey>,
    pub admin: UInt160,
    pub issuer: UInt160,
    pub expiration: u32,
    pub is_frozen: bool,
}

impl Serializable for AssetState {
    fn size(&self) -> usize {
        1 + UInt256::LEN
            + 1
            + var_string_size(&self.name)
            + 8
            + 8
            + 1
            + 1
            + 8
            + UInt160::LEN
            + self.owner.map_or(1, |o| o.size())
            + UInt160::LEN * 2
            + 4
            + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        self.asset_id.serialize(writer);
        writer.write_u8(self.asset_type as u8);
        writer.write_var_string(&self.name);
        self.amount.serialize(writer);
        self.available.serialize(writer);
        writer.write_u8(self.precision);
        // fee mode, always 0
        writer.write_u8(0);
        self.fee.serialize(writer);
        self.fee_address.serialize(writer);
        match &self.owner {
            Some(owner) => owner.serialize(writer),
            None => writer.write_u8(0),
        }
        self.admin.serialize(writer);
        self.issuer.serialize(writer);
        writer.write_u32(self.expiration);
        writer.write_bool(self.is_frozen);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        let asset_id = reader.read_serializable()?;
        let asset_type = AssetType::from_byte(reader.read_u8()?)?;
        let name = reader.read_var_string(1024)?;
        let amount = reader.read_serializable()?;
        let available = reader.read_serializable()?;
        let precision = reader.read_u8()?;
        reader.read_u8()?;
        let fee = reader.read_serializable()?;
        let fee_address = reader.read_serializable()?;
        let owner = match reader.peek_u8()? {
            0 => {
                reader.read_u8()?;
                None
            }
            _ => Some(reader.read_serializable()?),
        };
        Ok(Self {
            asset_id,
            asset_type,
            name,
            amount,
            available,
            precision,
            fee,
            fee_address,
            owner,
            admin: reader.read_serializable()?,
            issuer: reader.read_serializable()?,
            expiration: reader.read_u32()?,
            is_frozen: reader.read_bool()?,
        })
    }
}

pub mod contract_properties {
    pub const NO_PROPERTY: u8 = 0;
    pub const HAS_STORAGE: u8 = 1 << 0;
    pub const HAS_DYNAMIC_INVOKE: u8 = 1 << 1;
    pub const PAYABLE: u8 = 1 << 2;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    pub script: Vec<u8>,
    pub parameter_list: Vec<u8>,
    pub return_type: u8,
    pub properties: u8,
    pub name: String,
    pub code_version: String,
    pub author: String,
    pub email: String,
    pub description: String,
}

impl ContractState {
    pub fn script_hash(&self) -> UInt160 {
        script_hash(&self.script)
    }

    pub fn has_storage(&self) -> bool {
        self.properties & contract_properties::HAS_STORAGE != 0
    }

    pub fn is_payable(&self) -> bool {
        self.properties & contract_properties::PAYABLE != 0
    }
}

impl Serializable for ContractState {
    fn size(&self) -> usize {
        1 + var_bytes_size(self.script.len())
            + var_bytes_size(self.parameter_list.len())
            + 2
            + var_string_size(&self.name)
            + var_string_size(&self.code_version)
            + var_string_size(&self.author)
            + var_string_size(&self.email)
            + var_string_size(&self.description)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        writer.write_var_bytes(&self.script);
        writer.write_var_bytes(&self.parameter_list);
        writer.write_u8(self.return_type);
        writer.write_u8(self.properties);
        for text in [
            &self.name,
            &self.code_version,
            &self.author,
            &self.email,
            &self.description,
        ] {
            writer.write_var_string(text);
        }
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            script: reader.read_var_bytes(1024 * 1024)?,
            parameter_list: reader.read_var_bytes(252)?,
            return_type: reader.read_u8()?,
            properties: reader.read_u8()?,
            name: reader.read_var_string(252)?,
            code_version: reader.read_var_string(252)?,
            author: reader.read_var_string(252)?,
            email: reader.read_var_string(252)?,
            description: reader.read_var_string(65536)?,
        })
    }
}

const GROUP_SIZE: usize = 16;

/// Contract-scoped storage key.
///
/// The key bytes are written in 16-byte groups, each followed by a marker:
/// `0` after a full group with more to come, otherwise the count of zero
/// padding bytes in the final group. A key whose length is a multiple of 16
/// ends with an all-padding group. Prefix searches over the encoded form
/// therefore match whole groups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub script_hash: UInt160,
    pub key: Vec<u8>,
}

impl StorageKey {
    pub fn new(script_hash: UInt160, key: Vec<u8>) -> Self {
        Self { script_hash, key }
    }
}

impl Serializable for StorageKey {
    fn size(&self) -> usize {
        UInt160::LEN + (self.key.len() / GROUP_SIZE + 1) * (GROUP_SIZE + 1)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.script_hash.serialize(writer);
        let mut chunks = self.key.chunks_exact(GROUP_SIZE);
        for group in chunks.by_ref() {
            writer.write_bytes(group);
            writer.write_u8(0);
        }
        let rest = chunks.remainder();
        let padding = GROUP_SIZE - rest.len();
        writer.write_bytes(rest);
        writer.write_bytes(&[0u8; GROUP_SIZE][..padding]);
        writer.write_u8(padding as u8);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let script_hash = reader.read_serializable()?;
        let mut key = Vec::new();
        loop {
            let group = reader.read_bytes(GROUP_SIZE)?;
            let padding = usize::from(reader.read_u8()?);
            if padding > GROUP_SIZE {
                return Err(FormatError::LimitExceeded {
                    value: padding as u64,
                    max: GROUP_SIZE as u64,
                });
            }
            key.extend_from_slice(&group[..GROUP_SIZE - padding]);
            if padding != 0 {
                break;
            }
        }
        Ok(Self { script_hash, key })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageItem {
    pub value: Vec<u8>,
    pub is_constant: bool,
}

impl Serializable for StorageItem {
    fn size(&self) -> usize {
        1 + var_bytes_size(self.value.len()) + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        writer.write_var_bytes(&self.value);
        writer.write_bool(self.is_constant);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            value: reader.read_var_bytes(65536)?,
            is_constant: reader.read_bool()?,
        })
    }
}

/// Per-output coin flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoinState(pub u8);

impl CoinState {
    pub const UNCONFIRMED: Self = Self(0);
    pub const CONFIRMED: Self = Self(1 << 0);
    pub const SPENT: Self = Self(1 << 1);
    pub const CLAIMED: Self = Self(1 << 3);
    pub const FROZEN: Self = Self(1 << 5);

    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentCoinState {
    pub items: Vec<CoinState>,
}

impl UnspentCoinState {
    pub fn confirmed(count: usize) -> Self {
        Self {
            items: vec![CoinState::CONFIRMED; count],
        }
    }

    pub fn is_spent(&self, index: u16) -> bool {
        self.items
            .get(usize::from(index))
            .map_or(true, |c| c.contains(CoinState::SPENT))
    }
}

impl Serializable for UnspentCoinState {
    fn size(&self) -> usize {
        1 + var_bytes_size(self.items.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        let flags: Vec<u8> = self.items.iter().map(|c| c.0).collect();
        writer.write_var_bytes(&flags);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            items: reader
                .read_var_bytes(u16::MAX as usize + 1)?
                .into_iter()
                .map(CoinState)
                .collect(),
        })
    }
}

/// Governing-token outputs of one transaction that were spent and can
/// still be claimed, mapped to the height that spent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentCoinState {
    pub transaction_hash: UInt256,
    pub transaction_height: u32,
    pub items: BTreeMap<u16, u32>,
}

impl Serializable for SpentCoinState {
    fn size(&self) -> usize {
        1 + UInt256::LEN + 4 + var_int_size(self.items.len() as u64) + self.items.len() * 6
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        self.transaction_hash.serialize(writer);
        writer.write_u32(self.transaction_height);
        writer.write_var_int(self.items.len() as u64);
        for (index, height) in &self.items {
            writer.write_u16(*index);
            writer.write_u32(*height);
        }
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        let transaction_hash = reader.read_serializable()?;
        let transaction_height = reader.read_u32()?;
        let count = reader.read_var_int(u64::from(u16::MAX) + 1)?;
        let mut items = BTreeMap::new();
        for _ in 0..count {
            let index = reader.read_u16()?;
            items.insert(index, reader.read_u32()?);
        }
        Ok(Self {
            transaction_hash,
            transaction_height,
            items,
        })
    }
}

/// Stored block: running system fee total (whole utility units) plus the
/// trimmed block. A header stored ahead of its block has no hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockState {
    pub system_fee_amount: i64,
    pub trimmed_block: TrimmedBlock,
}

impl Serializable for BlockState {
    fn size(&self) -> usize {
        1 + 8 + self.trimmed_block.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        writer.write_i64(self.system_fee_amount);
        self.trimmed_block.serialize(writer);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            system_fee_amount: reader.read_i64()?,
            trimmed_block: reader.read_serializable()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionState {
    pub block_index: u32,
    pub transaction: Transaction,
}

impl Serializable for TransactionState {
    fn size(&self) -> usize {
        1 + 4 + self.transaction.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        writer.write_u32(self.block_index);
        self.transaction.serialize(writer);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            block_index: reader.read_u32()?,
            transaction: reader.read_serializable()?,
        })
    }
}

/// Governing-token weight behind vote lists of each length:
/// `votes[n - 1]` sums the balances of accounts voting for `n` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorsCountState {
    pub votes: Vec<Fixed8>,
}

impl ValidatorsCountState {
    pub const MAX_VALIDATORS: usize = 1024;
}

impl Default for ValidatorsCountState {
    fn default() -> Self {
        Self {
            votes: vec![Fixed8::ZERO; Self::MAX_VALIDATORS],
        }
    }
}

impl Serializable for ValidatorsCountState {
    fn size(&self) -> usize {
        1 + array_size(&self.votes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        writer.write_serializable_array(&self.votes);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            votes: reader.read_serializable_array(Self::MAX_VALIDATORS)?,
        })
    }
}

/// Hash and height of the chain tip. The empty chain has index `u32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashIndexState {
    pub hash: UInt256,
    pub index: u32,
}

impl Default for HashIndexState {
    fn default() -> Self {
        Self {
            hash: UInt256::ZERO,
            index: u32::MAX,
        }
    }
}

impl Serializable for HashIndexState {
    fn size(&self) -> usize {
        1 + UInt256::LEN + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        self.hash.serialize(writer);
        writer.write_u32(self.index);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            hash: reader.read_serializable()?,
            index: reader.read_u32()?,
        })
    }
}

/// Block height as a storage key. Big-endian so stored order is numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeightKey(pub u32);

impl Serializable for HeightKey {
    fn size(&self) -> usize {
        4
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.0.to_be_bytes());
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let bytes = reader.read_bytes(4)?;
        Ok(Self(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])))
    }
}

/// A run of consecutive header hashes starting at the height in its key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderHashList {
    pub hashes: Vec<UInt256>,
}

impl HeaderHashList {
    /// Hashes per stored run.
    pub const BATCH: usize = 2000;
}

impl Serializable for HeaderHashList {
    fn size(&self) -> usize {
        1 + array_size(&self.hashes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(STATE_VERSION);
        writer.write_serializable_array(&self.hashes);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        read_version(reader)?;
        Ok(Self {
            hashes: reader.read_serializable_array(Self::BATCH)?,
        })
    }
}
