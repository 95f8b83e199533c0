//! Script opcodes understood by the verification engine.
//!
//! `PUSHBYTES1..=PUSHBYTES75` (`0x01..=0x4B`) push the following N bytes.

#![allow(missing_docs)]

pub const PUSH0: u8 = 0x00;
pub const PUSHBYTES1: u8 = 0x01;
pub const PUSHBYTES75: u8 = 0x4B;
pub const PUSHDATA1: u8 = 0x4C;
pub const PUSHDATA2: u8 = 0x4D;
pub const PUSHDATA4: u8 = 0x4E;
pub const PUSHM1: u8 = 0x4F;
pub const PUSHT: u8 = 0x51;
pub const PUSH1: u8 = 0x51;
pub const PUSH16: u8 = 0x60;

pub const NOP: u8 = 0x61;
pub const JMP: u8 = 0x62;
pub const JMPIF: u8 = 0x63;
pub const JMPIFNOT: u8 = 0x64;
pub const RET: u8 = 0x66;
pub const APPCALL: u8 = 0x67;
pub const SYSCALL: u8 = 0x68;

pub const DEPTH: u8 = 0x74;
pub const DROP: u8 = 0x75;
pub const DUP: u8 = 0x76;
pub const NIP: u8 = 0x77;
pub const OVER: u8 = 0x78;
pub const SWAP: u8 = 0x7C;

pub const SIZE: u8 = 0x82;
pub const EQUAL: u8 = 0x87;

pub const INC: u8 = 0x8B;
pub const DEC: u8 = 0x8C;
pub const NOT: u8 = 0x91;
pub const NZ: u8 = 0x92;
pub const ADD: u8 = 0x93;
pub const SUB: u8 = 0x94;
pub const BOOLAND: u8 = 0x9A;
pub const BOOLOR: u8 = 0x9B;
pub const NUMEQUAL: u8 = 0x9C;
pub const NUMNOTEQUAL: u8 = 0x9E;
pub const LT: u8 = 0x9F;
pub const GT: u8 = 0xA0;

pub const SHA256: u8 = 0xA8;
pub const HASH160: u8 = 0xA9;
pub const HASH256: u8 = 0xAA;
pub const CHECKSIG: u8 = 0xAC;
pub const VERIFY: u8 = 0xAD;
pub const CHECKMULTISIG: u8 = 0xAE;

pub const THROW: u8 = 0xF0;
pub const THROWIFNOT: u8 = 0xF1;
