//! # Message Payloads
//!
//! | Command | Payload | Limit |
//! |---------|---------|-------|
//! | `version` | [`VersionPayload`] | user agent ≤ 1024 bytes |
//! | `addr` | [`AddrPayload`] | ≤ 200 addresses |
//! | `inv`, `getdata` | [`InvPayload`] | ≤ 500 hashes |
//! | `getblocks`, `getheaders` | [`GetBlocksPayload`] | ≤ 16 start hashes |
//! | `headers` | [`HeadersPayload`] | ≤ 2000 headers |
//! | `filterload` | [`FilterLoadPayload`] | ≤ 36,000 bytes, K ≤ 50 |
//! | `filteradd` | [`FilterAddPayload`] | ≤ 520 bytes |
//! | `merkleblock` | [`MerkleBlockPayload`] | |

use bitvec::prelude::*;
use dc_02_ledger::{Block, Header, InventoryType, MerkleTree, MAX_TRANSACTIONS_PER_BLOCK};
use dc_06_bloom_filters::{
    BloomFilter, FilterResult, MAX_ELEMENT_SIZE, MAX_FILTER_SIZE, MAX_HASH_FUNCTIONS,
};
use shared_types::{
    array_size, var_bytes_size, var_int_size, var_string_size, BinaryReader, BinaryWriter,
    FormatError, Serializable, UInt256,
};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAX_USER_AGENT_SIZE: usize = 1024;
pub const MAX_ADDRESSES: usize = 200;
pub const MAX_HASHES: usize = 500;
pub const MAX_START_HASHES: usize = 16;
pub const MAX_HEADERS: usize = 2000;

/// Service bit for a full node.
pub const NODE_NETWORK: u64 = 1;

/// Seconds since the Unix epoch, saturating at the u32 range.
pub fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    pub version: u32,
    pub services: u64,
    pub timestamp: u32,
    /// Listening port, 0 when the sender accepts no connections.
    pub port: u16,
    pub nonce: u32,
    pub user_agent: String,
    pub start_height: u32,
    /// Whether the sender wants inventory announcements.
    pub relay: bool,
}

impl VersionPayload {
    pub fn new(port: u16, nonce: u32, user_agent: &str, start_height: u32) -> Self {
        Self {
            version: 0,
            services: NODE_NETWORK,
            timestamp: unix_time(),
            port,
            nonce,
            user_agent: user_agent.to_owned(),
            start_height,
            relay: true,
        }
    }
}

impl Serializable for VersionPayload {
    fn size(&self) -> usize {
        4 + 8 + 4 + 2 + 4 + var_string_size(&self.user_agent) + 4 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.version);
        writer.write_u64(self.services);
        writer.write_u32(self.timestamp);
        writer.write_u16(self.port);
        writer.write_u32(self.nonce);
        writer.write_var_string(&self.user_agent);
        writer.write_u32(self.start_height);
        writer.write_bool(self.relay);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            version: reader.read_u32()?,
            services: reader.read_u64()?,
            timestamp: reader.read_u32()?,
            port: reader.read_u16()?,
            nonce: reader.read_u32()?,
            user_agent: reader.read_var_string(MAX_USER_AGENT_SIZE)?,
            start_height: reader.read_u32()?,
            relay: reader.read_bool()?,
        })
    }
}

/// A peer endpoint as gossiped in `addr`. The address travels as 16 IPv6
/// bytes (IPv4 mapped) and the port big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAddressWithTime {
    pub timestamp: u32,
    pub services: u64,
    pub endpoint: SocketAddr,
}

impl NetworkAddressWithTime {
    pub fn new(endpoint: SocketAddr, services: u64, timestamp: u32) -> Self {
        Self {
            timestamp,
            services,
            endpoint,
        }
    }
}

impl Serializable for NetworkAddressWithTime {
    fn size(&self) -> usize {
        4 + 8 + 16 + 2
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.timestamp);
        writer.write_u64(self.services);
        let ip = match self.endpoint.ip() {
            IpAddr::V4(ip) => ip.to_ipv6_mapped(),
            IpAddr::V6(ip) => ip,
        };
        writer.write_bytes(&ip.octets());
        writer.write_bytes(&self.endpoint.port().to_be_bytes());
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let timestamp = reader.read_u32()?;
        let services = reader.read_u64()?;
        let mut octets = [0u8; 16];
        octets.copy_from_slice(reader.read_bytes(16)?);
        let ip = Ipv6Addr::from(octets);
        let ip = match ip.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(ip),
        };
        let mut port = [0u8; 2];
        port.copy_from_slice(reader.read_bytes(2)?);
        Ok(Self {
            timestamp,
            services,
            endpoint: SocketAddr::new(ip, u16::from_be_bytes(port)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrPayload {
    pub addresses: Vec<NetworkAddressWithTime>,
}

impl Serializable for AddrPayload {
    fn size(&self) -> usize {
        array_size(&self.addresses)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_serializable_array(&self.addresses);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            addresses: reader.read_serializable_array(MAX_ADDRESSES)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvPayload {
    pub inventory_type: InventoryType,
    pub hashes: Vec<UInt256>,
}

impl InvPayload {
    /// One payload; callers keep `hashes` within [`MAX_HASHES`].
    pub fn new(inventory_type: InventoryType, hashes: Vec<UInt256>) -> Self {
        Self {
            inventory_type,
            hashes,
        }
    }

    /// Split `hashes` into as many payloads as the per-message limit needs.
    pub fn create_group(inventory_type: InventoryType, hashes: &[UInt256]) -> Vec<Self> {
        hashes
            .chunks(MAX_HASHES)
            .map(|chunk| Self::new(inventory_type, chunk.to_vec()))
            .collect()
    }
}

impl Serializable for InvPayload {
    fn size(&self) -> usize {
        1 + array_size(&self.hashes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.inventory_type as u8);
        writer.write_serializable_array(&self.hashes);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            inventory_type: InventoryType::from_byte(reader.read_u8()?)?,
            hashes: reader.read_serializable_array(MAX_HASHES)?,
        })
    }
}

/// Request for what follows the first `hash_start` the receiver knows,
/// up to `hash_stop` (zero for "as many as allowed").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocksPayload {
    pub hash_start: Vec<UInt256>,
    pub hash_stop: UInt256,
}

impl GetBlocksPayload {
    pub fn new(start: UInt256) -> Self {
        Self {
            hash_start: vec![start],
            hash_stop: UInt256::ZERO,
        }
    }
}

impl Serializable for GetBlocksPayload {
    fn size(&self) -> usize {
        array_size(&self.hash_start) + 32
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_serializable_array(&self.hash_start);
        self.hash_stop.serialize(writer);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            hash_start: reader.read_serializable_array(MAX_START_HASHES)?,
            hash_stop: reader.read_serializable()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersPayload {
    pub headers: Vec<Header>,
}

impl Serializable for HeadersPayload {
    fn size(&self) -> usize {
        array_size(&self.headers)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_serializable_array(&self.headers);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            headers: reader.read_serializable_array(MAX_HEADERS)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterLoadPayload {
    pub filter: Vec<u8>,
    pub k: u8,
    pub tweak: u32,
}

impl FilterLoadPayload {
    pub fn from_filter(filter: &BloomFilter) -> Self {
        Self {
            filter: filter.bits(),
            k: filter.hash_count() as u8,
            tweak: filter.tweak(),
        }
    }

    pub fn to_filter(&self) -> FilterResult<BloomFilter> {
        BloomFilter::load(&self.filter, usize::from(self.k), self.tweak)
    }
}

impl Serializable for FilterLoadPayload {
    fn size(&self) -> usize {
        var_bytes_size(self.filter.len()) + 1 + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&self.filter);
        writer.write_u8(self.k);
        writer.write_u32(self.tweak);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let filter = reader.read_var_bytes(MAX_FILTER_SIZE)?;
        let k = reader.read_u8()?;
        if usize::from(k) > MAX_HASH_FUNCTIONS {
            return Err(FormatError::LimitExceeded {
                value: u64::from(k),
                max: MAX_HASH_FUNCTIONS as u64,
            });
        }
        Ok(Self {
            filter,
            k,
            tweak: reader.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterAddPayload {
    pub data: Vec<u8>,
}

impl Serializable for FilterAddPayload {
    fn size(&self) -> usize {
        var_bytes_size(self.data.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&self.data);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        Ok(Self {
            data: reader.read_var_bytes(MAX_ELEMENT_SIZE)?,
        })
    }
}

/// A block header with a partial Merkle tree proving which of its
/// transactions matched a peer's filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlockPayload {
    pub header: Header,
    pub tx_count: u32,
    /// Hashes left in the trimmed tree, depth first.
    pub hashes: Vec<UInt256>,
    /// One bit per transaction, least significant bit first.
    pub flags: Vec<u8>,
}

impl MerkleBlockPayload {
    pub fn create(block: &Block, flags: &[bool]) -> Self {
        let hashes = match MerkleTree::build(&block.transaction_hashes()) {
            Some(mut tree) => {
                tree.trim(flags);
                tree.to_hash_array()
            }
            None => Vec::new(),
        };
        let mut bits: BitVec<u8, Lsb0> = flags.iter().copied().collect();
        bits.set_uninitialized(false);
        Self {
            header: block.header.clone(),
            tx_count: block.transactions.len() as u32,
            hashes,
            flags: bits.into_vec(),
        }
    }
}

impl Serializable for MerkleBlockPayload {
    fn size(&self) -> usize {
        self.header.signed_size()
            + var_int_size(u64::from(self.tx_count))
            + array_size(&self.hashes)
            + var_bytes_size(self.flags.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.header.serialize_signed(writer);
        writer.write_var_int(u64::from(self.tx_count));
        writer.write_serializable_array(&self.hashes);
        writer.write_var_bytes(&self.flags);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let header = Header::deserialize_signed(reader)?;
        let tx_count = reader.read_var_int(MAX_TRANSACTIONS_PER_BLOCK as u64)? as u32;
        Ok(Self {
            header,
            tx_count,
            hashes: reader.read_serializable_array(tx_count as usize)?,
            flags: reader.read_var_bytes((tx_count as usize + 7) / 8)?,
        })
    }
}
