//! # Transactions
//!
//! One struct for every kind; the kind-specific fields live in
//! [`TransactionData`], selected by the leading type byte.
//!
//! | Type | Tag | Version | Exclusive data |
//! |------|-----|---------|----------------|
//! | Miner | `0x00` | 0 | `nonce: u32` |
//! | Claim | `0x02` | 0 | claimed coin references (non-empty) |
//! | Enrollment | `0x20` | 0 | public key |
//! | Contract | `0x80` | 0 | none |
//! | State | `0x90` | 0 | state descriptors (max 16) |
//! | Invocation | `0xd1` | 0 or 1 | script, and `gas` from version 1 |
//!
//! The hash is `hash256` of the unsigned encoding and is fixed at
//! construction; only witnesses may change afterwards.

use super::attribute::{AttributeUsage, TransactionAttribute};
use super::coin::{CoinReference, TransactionOutput};
use super::errors::{LedgerError, LedgerResult};
use super::genesis;
use super::inventory::{Inventory, InventoryType, Verifiable};
use super::state_descriptor::{StateDescriptor, StateType};
use super::states::AssetType;
use super::witness::Witness;
use crate::config::ProtocolSettings;
use crate::snapshot::Snapshot;
use shared_crypto::{hash256, signature_contract_hash, PublicKey};
use shared_types::{
    array_size, var_bytes_size, BinaryReader, BinaryWriter, Fixed8, FormatError, Serializable,
    UInt160, UInt256,
};
use std::collections::{BTreeMap, BTreeSet};

pub const MAX_TRANSACTION_SIZE: usize = 102_400;
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;
pub const MAX_INVOCATION_SCRIPT: usize = 65_536;
const MAX_STATE_DESCRIPTORS: usize = 16;
const MAX_INPUTS: usize = 0x0100_0000;
const MAX_OUTPUTS: usize = u16::MAX as usize + 1;
const MAX_WITNESSES: usize = 0x0100_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransactionType {
    Miner = 0x00,
    Claim = 0x02,
    Enrollment = 0x20,
    Contract = 0x80,
    State = 0x90,
    Invocation = 0xD1,
}

impl TransactionType {
    pub fn from_byte(tag: u8) -> Result<Self, FormatError> {
        Ok(match tag {
            0x00 => Self::Miner,
            0x02 => Self::Claim,
            0x20 => Self::Enrollment,
            0x80 => Self::Contract,
            0x90 => Self::State,
            0xD1 => Self::Invocation,
            _ => {
                return Err(FormatError::InvalidTag {
                    kind: "transaction type",
                    tag,
                })
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionData {
    /// Block reward carrier; first transaction of every block.
    Miner { nonce: u32 },
    /// Claims utility token generated by spent governing-token outputs.
    Claim { claims: Vec<CoinReference> },
    /// Legacy validator enrollment. Never verifies.
    Enrollment { public_key: PublicKey },
    Contract,
    State { descriptors: Vec<StateDescriptor> },
    Invocation { script: Vec<u8>, gas: Fixed8 },
}

impl TransactionData {
    pub fn tx_type(&self) -> TransactionType {
        match self {
            Self::Miner { .. } => TransactionType::Miner,
            Self::Claim { .. } => TransactionType::Claim,
            Self::Enrollment { .. } => TransactionType::Enrollment,
            Self::Contract => TransactionType::Contract,
            Self::State { .. } => TransactionType::State,
            Self::Invocation { .. } => TransactionType::Invocation,
        }
    }

    fn size(&self, version: u8) -> usize {
        match self {
            Self::Miner { .. } => 4,
            Self::Claim { claims } => array_size(claims),
            Self::Enrollment { .. } => 33,
            Self::Contract => 0,
            Self::State { descriptors } => array_size(descriptors),
            Self::Invocation { script, .. } => {
                var_bytes_size(script.len()) + if version >= 1 { 8 } else { 0 }
            }
        }
    }

    fn serialize(&self, version: u8, writer: &mut BinaryWriter) {
        match self {
            Self::Miner { nonce } => writer.write_u32(*nonce),
            Self::Claim { claims } => writer.write_serializable_array(claims),
            Self::Enrollment { public_key } => public_key.serialize(writer),
            Self::Contract => {}
            Self::State { descriptors } => writer.write_serializable_array(descriptors),
            Self::Invocation { script, gas } => {
                writer.write_var_bytes(script);
                if version >= 1 {
                    gas.serialize(writer);
                }
            }
        }
    }

    fn deserialize(
        tx_type: TransactionType,
        version: u8,
        reader: &mut BinaryReader<'_>,
    ) -> Result<Self, FormatError> {
        Ok(match tx_type {
            TransactionType::Miner => Self::Miner {
                nonce: reader.read_u32()?,
            },
            TransactionType::Claim => Self::Claim {
                claims: reader.read_serializable_array(MAX_INPUTS)?,
            },
            TransactionType::Enrollment => Self::Enrollment {
                public_key: reader.read_serializable()?,
            },
            TransactionType::Contract => Self::Contract,
            TransactionType::State => Self::State {
                descriptors: reader.read_serializable_array(MAX_STATE_DESCRIPTORS)?,
            },
            TransactionType::Invocation => {
                let script = reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?;
                let gas = if version >= 1 {
                    reader.read_serializable()?
                } else {
                    Fixed8::ZERO
                };
                Self::Invocation { script, gas }
            }
        })
    }
}

/// Balance change of one asset: inputs minus outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionResult {
    pub asset_id: UInt256,
    pub amount: Fixed8,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    version: u8,
    data: TransactionData,
    attributes: Vec<TransactionAttribute>,
    inputs: Vec<CoinReference>,
    outputs: Vec<TransactionOutput>,
    witnesses: Vec<Witness>,
    hash: UInt256,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.witnesses == other.witnesses
    }
}

impl Eq for Transaction {}

impl Transaction {
    pub fn new(
        version: u8,
        data: TransactionData,
        attributes: Vec<TransactionAttribute>,
        inputs: Vec<CoinReference>,
        outputs: Vec<TransactionOutput>,
    ) -> Result<Self, FormatError> {
        check_shape(version, &data, &attributes, &inputs, outputs.len())?;
        let mut tx = Self {
            version,
            data,
            attributes,
            inputs,
            outputs,
            witnesses: Vec::new(),
            hash: UInt256::ZERO,
        };
        tx.hash = hash256(&tx.hash_data());
        Ok(tx)
    }

    pub fn miner(nonce: u32, outputs: Vec<TransactionOutput>) -> Self {
        Self {
            version: 0,
            data: TransactionData::Miner { nonce },
            attributes: Vec::new(),
            inputs: Vec::new(),
            outputs,
            witnesses: Vec::new(),
            hash: UInt256::ZERO,
        }
        .rehashed()
    }

    pub fn contract(inputs: Vec<CoinReference>, outputs: Vec<TransactionOutput>) -> Self {
        Self {
            version: 0,
            data: TransactionData::Contract,
            attributes: Vec::new(),
            inputs,
            outputs,
            witnesses: Vec::new(),
            hash: UInt256::ZERO,
        }
        .rehashed()
    }

    fn rehashed(mut self) -> Self {
        self.hash = hash256(&self.hash_data());
        self
    }

    pub fn with_witnesses(mut self, witnesses: Vec<Witness>) -> Self {
        self.witnesses = witnesses;
        self
    }

    pub fn set_witnesses(&mut self, witnesses: Vec<Witness>) {
        self.witnesses = witnesses;
    }

    pub fn hash(&self) -> UInt256 {
        self.hash
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn tx_type(&self) -> TransactionType {
        self.data.tx_type()
    }

    pub fn data(&self) -> &TransactionData {
        &self.data
    }

    pub fn attributes(&self) -> &[TransactionAttribute] {
        &self.attributes
    }

    pub fn inputs(&self) -> &[CoinReference] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        &self.outputs
    }

    pub fn is_miner(&self) -> bool {
        matches!(self.data, TransactionData::Miner { .. })
    }

    /// Claimed references of a claim transaction, empty otherwise.
    pub fn claims(&self) -> &[CoinReference] {
        match &self.data {
            TransactionData::Claim { claims } => claims,
            _ => &[],
        }
    }

    /// Fee burned from the utility token for including this transaction.
    pub fn system_fee(&self, settings: &ProtocolSettings) -> Fixed8 {
        match &self.data {
            TransactionData::Invocation { gas, .. } => *gas,
            TransactionData::Enrollment { .. } => settings.validator_registration_fee,
            TransactionData::State { descriptors } => descriptors
                .iter()
                .map(|d| d.system_fee(settings.validator_registration_fee))
                .fold(Fixed8::ZERO, |acc, fee| acc.checked_add(fee).unwrap_or(Fixed8::MAX)),
            _ => Fixed8::ZERO,
        }
    }

    fn unsigned_size(&self) -> usize {
        2 + self.data.size(self.version)
            + array_size(&self.attributes)
            + array_size(&self.inputs)
            + array_size(&self.outputs)
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.tx_type() as u8);
        writer.write_u8(self.version);
        self.data.serialize(self.version, writer);
        writer.write_serializable_array(&self.attributes);
        writer.write_serializable_array(&self.inputs);
        writer.write_serializable_array(&self.outputs);
    }

    /// Outputs spent by the inputs, keyed by reference.
    pub fn references(
        &self,
        snapshot: &Snapshot,
    ) -> LedgerResult<BTreeMap<CoinReference, TransactionOutput>> {
        resolve_outputs(&self.inputs, snapshot)
    }

    /// Per-asset inputs minus outputs; zero entries are omitted.
    pub fn transaction_results(&self, snapshot: &Snapshot) -> LedgerResult<Vec<TransactionResult>> {
        let mut totals: BTreeMap<UInt256, Fixed8> = BTreeMap::new();
        for output in self.references(snapshot)?.values() {
            let entry = totals.entry(output.asset_id).or_insert(Fixed8::ZERO);
            *entry = entry.checked_add(output.value)?;
        }
        for output in &self.outputs {
            let entry = totals.entry(output.asset_id).or_insert(Fixed8::ZERO);
            *entry = entry.checked_sub(output.value)?;
        }
        Ok(totals
            .into_iter()
            .filter(|(_, amount)| *amount != Fixed8::ZERO)
            .map(|(asset_id, amount)| TransactionResult { asset_id, amount })
            .collect())
    }

    /// Utility token paid beyond the system fee. Zero for miner and claim transactions.
    pub fn network_fee(&self, snapshot: &Snapshot) -> LedgerResult<Fixed8> {
        if matches!(
            self.data,
            TransactionData::Miner { .. } | TransactionData::Claim { .. }
        ) {
            return Ok(Fixed8::ZERO);
        }
        let utility = genesis::utility_token_id();
        let input = Fixed8::checked_sum(
            self.references(snapshot)?
                .values()
                .filter(|o| o.asset_id == utility)
                .map(|o| o.value),
        )?;
        let output = Fixed8::checked_sum(
            self.outputs
                .iter()
                .filter(|o| o.asset_id == utility)
                .map(|o| o.value),
        )?;
        Ok(input
            .checked_sub(output)?
            .checked_sub(self.system_fee(snapshot.settings()))?)
    }
}

pub(crate) fn resolve_outputs(
    references: &[CoinReference],
    snapshot: &Snapshot,
) -> LedgerResult<BTreeMap<CoinReference, TransactionOutput>> {
    let mut grouped: BTreeMap<UInt256, Vec<CoinReference>> = BTreeMap::new();
    for reference in references {
        grouped.entry(reference.prev_hash).or_default().push(*reference);
    }
    let mut resolved = BTreeMap::new();
    for (hash, group) in grouped {
        let prev = snapshot
            .get_transaction(&hash)?
            .ok_or(LedgerError::UnknownTransaction(hash))?;
        for reference in group {
            let output = prev
                .outputs
                .get(usize::from(reference.prev_index))
                .ok_or(LedgerError::MissingOutput {
                    hash,
                    index: reference.prev_index,
                })?;
            resolved.insert(reference, output.clone());
        }
    }
    Ok(resolved)
}

fn check_shape(
    version: u8,
    data: &TransactionData,
    attributes: &[TransactionAttribute],
    inputs: &[CoinReference],
    output_count: usize,
) -> Result<(), FormatError> {
    let max_version = match data {
        TransactionData::Invocation { .. } => 1,
        _ => 0,
    };
    if version > max_version {
        return Err(FormatError::invalid(format!(
            "unsupported {:?} version {version}",
            data.tx_type()
        )));
    }
    if attributes.len() > MAX_TRANSACTION_ATTRIBUTES {
        return Err(FormatError::LimitExceeded {
            value: attributes.len() as u64,
            max: MAX_TRANSACTION_ATTRIBUTES as u64,
        });
    }
    if output_count > MAX_OUTPUTS {
        return Err(FormatError::LimitExceeded {
            value: output_count as u64,
            max: MAX_OUTPUTS as u64,
        });
    }
    match data {
        TransactionData::Miner { .. } if !inputs.is_empty() => {
            Err(FormatError::invalid("miner transaction spends inputs"))
        }
        TransactionData::Claim { claims } if claims.is_empty() => {
            Err(FormatError::invalid("claim transaction without claims"))
        }
        TransactionData::Claim { .. } if !inputs.is_empty() => {
            Err(FormatError::invalid("claim transaction spends inputs"))
        }
        TransactionData::Invocation { script, gas } => {
            if script.is_empty() {
                Err(FormatError::invalid("empty invocation script"))
            } else if gas.is_negative() {
                Err(FormatError::invalid("negative invocation gas"))
            } else if version == 0 && *gas != Fixed8::ZERO {
                Err(FormatError::invalid("version 0 invocation carries gas"))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

impl Serializable for Transaction {
    fn size(&self) -> usize {
        self.unsigned_size() + array_size(&self.witnesses)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_serializable_array(&self.witnesses);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let tx_type = TransactionType::from_byte(reader.read_u8()?)?;
        let version = reader.read_u8()?;
        let data = TransactionData::deserialize(tx_type, version, reader)?;
        let attributes = reader.read_serializable_array(MAX_TRANSACTION_ATTRIBUTES)?;
        let inputs = reader.read_serializable_array(MAX_INPUTS)?;
        let outputs = reader.read_serializable_array(MAX_OUTPUTS)?;
        let witnesses = reader.read_serializable_array(MAX_WITNESSES)?;
        Ok(Self::new(version, data, attributes, inputs, outputs)?.with_witnesses(witnesses))
    }
}

impl Verifiable for Transaction {
    fn witnesses(&self) -> &[Witness] {
        &self.witnesses
    }

    fn hash_data(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.unsigned_size());
        self.serialize_unsigned(&mut writer);
        writer.into_bytes()
    }

    fn script_hashes_for_verifying(&self, snapshot: &Snapshot) -> LedgerResult<Vec<UInt160>> {
        let mut hashes: BTreeSet<UInt160> = self
            .references(snapshot)?
            .values()
            .map(|o| o.script_hash)
            .collect();
        for attr in &self.attributes {
            if attr.usage == AttributeUsage::Script {
                hashes.insert(UInt160::from_slice(&attr.data)?);
            }
        }
        let mut by_asset: BTreeMap<UInt256, Vec<UInt160>> = BTreeMap::new();
        for output in &self.outputs {
            by_asset
                .entry(output.asset_id)
                .or_default()
                .push(output.script_hash);
        }
        for (asset_id, owners) in by_asset {
            let asset = snapshot
                .assets
                .try_get(&asset_id)?
                .ok_or(LedgerError::UnknownAsset(asset_id))?;
            if asset.asset_type.has_duty_flag() {
                hashes.extend(owners);
            }
        }
        match &self.data {
            TransactionData::Claim { claims } => {
                hashes.extend(resolve_outputs(claims, snapshot)?.values().map(|o| o.script_hash));
            }
            TransactionData::Enrollment { public_key } => {
                hashes.insert(signature_contract_hash(public_key));
            }
            TransactionData::State { descriptors } => {
                for descriptor in descriptors {
                    hashes.insert(match descriptor.state_type {
                        StateType::Account => descriptor.account_hash()?,
                        StateType::Validator => {
                            signature_contract_hash(&descriptor.validator_key()?)
                        }
                    });
                }
            }
            _ => {}
        }
        Ok(hashes.into_iter().collect())
    }
}

impl Inventory for Transaction {
    fn hash(&self) -> UInt256 {
        self.hash
    }

    fn inventory_type(&self) -> InventoryType {
        InventoryType::Transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(value: i64) -> TransactionOutput {
        TransactionOutput::new(
            genesis::utility_token_id(),
            Fixed8::from_raw(value),
            UInt160::from([1; 20]),
        )
    }

    #[test]
    fn test_round_trip_keeps_hash_and_size() {
        let tx = Transaction::new(
            0,
            TransactionData::Contract,
            vec![TransactionAttribute::remark(b"memo")],
            vec![CoinReference::new(UInt256::from([3; 32]), 1)],
            vec![output(5)],
        )
        .unwrap()
        .with_witnesses(vec![Witness::new(vec![1, 2], vec![0x51])]);
        let bytes = tx.to_array();
        assert_eq!(bytes.len(), tx.size());
        let decoded = Transaction::from_array(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), hash256(&tx.hash_data()));
    }

    #[test]
    fn test_witnesses_do_not_change_hash() {
        let tx = Transaction::miner(7, vec![output(1)]);
        let hash = tx.hash();
        let signed = tx.with_witnesses(vec![Witness::new(vec![], vec![0x51])]);
        assert_eq!(signed.hash(), hash);
    }

    #[test]
    fn test_version_rules() {
        let invocation = |version, gas| {
            Transaction::new(
                version,
                TransactionData::Invocation {
                    script: vec![0x51],
                    gas,
                },
                vec![],
                vec![],
                vec![],
            )
        };
        assert!(invocation(1, Fixed8::ONE).is_ok());
        assert!(invocation(0, Fixed8::ZERO).is_ok());
        assert!(invocation(0, Fixed8::ONE).is_err());
        assert!(invocation(2, Fixed8::ZERO).is_err());
        assert!(invocation(1, Fixed8::from_raw(-1)).is_err());
        assert!(Transaction::new(1, TransactionData::Contract, vec![], vec![], vec![]).is_err());
    }

    #[test]
    fn test_invocation_v0_has_no_gas_field() {
        let tx = Transaction::new(
            0,
            TransactionData::Invocation {
                script: vec![0x51],
                gas: Fixed8::ZERO,
            },
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        // type, version, script (2), three empty arrays, witnesses
        assert_eq!(tx.size(), 2 + 2 + 3 + 1);
    }

    #[test]
    fn test_shape_rejections() {
        let input = CoinReference::new(UInt256::ZERO, 0);
        assert!(Transaction::new(
            0,
            TransactionData::Miner { nonce: 1 },
            vec![],
            vec![input],
            vec![]
        )
        .is_err());
        assert!(Transaction::new(
            0,
            TransactionData::Claim { claims: vec![] },
            vec![],
            vec![],
            vec![]
        )
        .is_err());
        let too_many = vec![TransactionAttribute::remark(b"x"); 17];
        assert!(Transaction::new(0, TransactionData::Contract, too_many, vec![], vec![]).is_err());
    }

    #[test]
    fn test_unknown_type_tag() {
        assert!(matches!(
            Transaction::from_array(&[0x42, 0]),
            Err(FormatError::InvalidTag { .. })
        ));
    }
}
