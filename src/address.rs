use std::fmt;

use crate::{Error, Result};

/// Role a reading plays within a pool+index slot.
///
/// The portal treats channel letters as an open set; a fixed subset carries
/// defined semantics (value, status, unit, min, max, type). Unknown letters
/// pass through as [`Channel::Other`] so forward-compatible payloads survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Value,
    Status,
    Unit,
    Min,
    Max,
    Type,
    Other(char),
}

impl Channel {
    pub fn from_letter(c: char) -> Option<Self> {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        Some(match c {
            'v' => Channel::Value,
            's' => Channel::Status,
            'u' => Channel::Unit,
            'n' => Channel::Min,
            'x' => Channel::Max,
            't' => Channel::Type,
            other => Channel::Other(other),
        })
    }

    pub fn letter(&self) -> char {
        match self {
            Channel::Value => 'v',
            Channel::Status => 's',
            Channel::Unit => 'u',
            Channel::Min => 'n',
            Channel::Max => 'x',
            Channel::Type => 't',
            Channel::Other(c) => *c,
        }
    }
}

/// Canonical parameter address: `P<pool>.<chan><idx>`, optionally suffixed
/// with `_bit<n>` for the synthetic per-bit binary-sensor form.
///
/// `(pool, channel, index, bit)` uniquely identifies one observable quantity.
/// Bit-suffixed addresses on the same `(pool, channel, index)` are distinct
/// logical entities sharing one underlying raw integer value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamAddress {
    pub pool: String,
    pub channel: Channel,
    pub index: u32,
    pub bit: Option<u8>,
}

impl ParamAddress {
    pub fn new(pool: impl Into<String>, channel: Channel, index: u32) -> Self {
        Self {
            pool: pool.into(),
            channel,
            index,
            bit: None,
        }
    }

    pub fn with_bit(mut self, bit: u8) -> Self {
        self.bit = Some(bit);
        self
    }

    /// Parse the canonical text form, e.g. `P4.v1` or `P5.s40_bit3`.
    ///
    /// Callers on the ingestion path convert this failure into "drop the
    /// update"; it must never cross a store boundary as a panic.
    pub fn parse(text: &str) -> Result<Self> {
        let err = || Error::AddressFormat(text.to_string());

        let (base, bit) = match text.split_once("_bit") {
            Some((base, bit_str)) => {
                let bit: u8 = bit_str.parse().map_err(|_| err())?;
                if bit > 31 || bit_str.len() > 2 || bit_str.is_empty() {
                    return Err(err());
                }
                (base, Some(bit))
            }
            None => (text, None),
        };

        let (pool, rest) = base.split_once('.').ok_or_else(err)?;

        let digits = pool.strip_prefix('P').ok_or_else(err)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let mut chars = rest.chars();
        let channel = chars
            .next()
            .and_then(Channel::from_letter)
            .ok_or_else(err)?;
        let idx_str = chars.as_str();
        if idx_str.is_empty() || !idx_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let index: u32 = idx_str.parse().map_err(|_| err())?;

        Ok(Self {
            pool: pool.to_string(),
            channel,
            index,
            bit,
        })
    }

    /// The `(pool, index)` group this address belongs to.
    pub fn family_key(&self) -> (String, u32) {
        (self.pool.clone(), self.index)
    }

    /// Same address without the bit suffix.
    pub fn base(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            channel: self.channel,
            index: self.index,
            bit: None,
        }
    }
}

impl fmt::Display for ParamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.pool, self.channel.letter(), self.index)?;
        if let Some(bit) = self.bit {
            write!(f, "_bit{bit}")?;
        }
        Ok(())
    }
}
