use std::fmt;

use naia_serde::{BitReader, BitWrite, Serde, SerdeErr};

/// Authoritative timestamp stamped by the server on every delta of a pool.
/// Strictly increasing per pool, wrapping at `u16::MAX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stamp(u16);

impl Stamp {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn is_newer_than(&self, other: &Stamp) -> bool {
        sequence_greater_than(self.0, other.0)
    }

    pub fn is_older_than(&self, other: &Stamp) -> bool {
        sequence_less_than(self.0, other.0)
    }

    /// Signed distance from `self` forward to `other`.
    pub fn distance_to(&self, other: &Stamp) -> i16 {
        wrapping_diff(self.0, other.0)
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl Serde for Stamp {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.0.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self(u16::de(reader)?))
    }

    fn bit_length(&self) -> u32 {
        u16::BITS
    }
}

/// sequence_greater_than(2,1) is true, sequence_greater_than(1,2) and
/// sequence_greater_than(1,1) are false
fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= 32768)) || ((s1 < s2) && (s2 - s1 > 32768))
}

fn sequence_less_than(s1: u16, s2: u16) -> bool {
    sequence_greater_than(s2, s1)
}

fn wrapping_diff(a: u16, b: u16) -> i16 {
    b.wrapping_sub(a) as i16
}
