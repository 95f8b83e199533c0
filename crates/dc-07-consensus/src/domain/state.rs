//! Round progress flags. Several hold at once, e.g. a backup that received
//! the request and sent its signature is `BACKUP | REQUEST_RECEIVED |
//! SIGNATURE_SENT`.

use std::fmt;
use std::ops::{BitAnd, BitOr};

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsensusState(u8);

impl ConsensusState {
    pub const INITIAL: Self = Self(0x00);
    pub const PRIMARY: Self = Self(0x01);
    pub const BACKUP: Self = Self(0x02);
    pub const REQUEST_SENT: Self = Self(0x04);
    pub const REQUEST_RECEIVED: Self = Self(0x08);
    pub const SIGNATURE_SENT: Self = Self(0x10);
    pub const BLOCK_SENT: Self = Self(0x20);
    pub const VIEW_CHANGING: Self = Self(0x40);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::PRIMARY, "Primary"),
        (Self::BACKUP, "Backup"),
        (Self::REQUEST_SENT, "RequestSent"),
        (Self::REQUEST_RECEIVED, "RequestReceived"),
        (Self::SIGNATURE_SENT, "SignatureSent"),
        (Self::BLOCK_SENT, "BlockSent"),
        (Self::VIEW_CHANGING, "ViewChanging"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    /// True when every flag of `other` is set. `INITIAL` has no flags, so
    /// test it with `==`.
    pub fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for ConsensusState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for ConsensusState {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ConsensusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("Initial");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConsensusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsensusState({self})")
    }
}
