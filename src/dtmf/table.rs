//! DTMF frequency table
//!
//! The keypad is a 4×4 grid: the row selects the low-group tone, the column
//! the high-group tone. Every symbol is the superposition of exactly one of
//! each. Space stands for silence and is the only zero-frequency entry.
//!
//! ```text
//!           1209  1336  1477  1633
//!     697     1     2     3     A
//!     770     4     5     6     B
//!     852     7     8     9     C
//!     941     *     0     #     D
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{DtmfError, DtmfResult};

/// Row frequencies in Hz
pub const LOW_GROUP: [u16; 4] = [697, 770, 852, 941];

/// Column frequencies in Hz
pub const HIGH_GROUP: [u16; 4] = [1209, 1336, 1477, 1633];

/// All eight DTMF frequencies, low group first
pub const DTMF_FREQUENCIES: [u16; 8] = [697, 770, 852, 941, 1209, 1336, 1477, 1633];

/// One character of the DTMF alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtmfSymbol {
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Star,
    Pound,
    A,
    B,
    C,
    D,
    /// Silence
    Space,
}

use DtmfSymbol::*;

const KEYPAD: [[DtmfSymbol; 4]; 4] = [
    [Digit1, Digit2, Digit3, A],
    [Digit4, Digit5, Digit6, B],
    [Digit7, Digit8, Digit9, C],
    [Star, Digit0, Pound, D],
];

/// Low/high tone pair in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrequencyPair {
    pub low: u16,
    pub high: u16,
}

impl FrequencyPair {
    pub const SILENCE: FrequencyPair = FrequencyPair { low: 0, high: 0 };

    pub const fn new(low: u16, high: u16) -> Self {
        Self { low, high }
    }

    pub fn is_silence(self) -> bool {
        self == Self::SILENCE
    }
}

impl DtmfSymbol {
    /// Every symbol, keypad order, silence last
    pub const ALL: [DtmfSymbol; 17] = [
        Digit1, Digit2, Digit3, A, Digit4, Digit5, Digit6, B, Digit7, Digit8, Digit9, C, Star,
        Digit0, Pound, D, Space,
    ];

    /// Tone pair for this symbol
    pub fn frequency_pair(self) -> FrequencyPair {
        match self.keypad_position() {
            Some((row, col)) => FrequencyPair::new(LOW_GROUP[row], HIGH_GROUP[col]),
            None => FrequencyPair::SILENCE,
        }
    }

    fn keypad_position(self) -> Option<(usize, usize)> {
        let pos = match self {
            Digit1 => (0, 0),
            Digit2 => (0, 1),
            Digit3 => (0, 2),
            A => (0, 3),
            Digit4 => (1, 0),
            Digit5 => (1, 1),
            Digit6 => (1, 2),
            B => (1, 3),
            Digit7 => (2, 0),
            Digit8 => (2, 1),
            Digit9 => (2, 2),
            C => (2, 3),
            Star => (3, 0),
            Digit0 => (3, 1),
            Pound => (3, 2),
            D => (3, 3),
            Space => return None,
        };
        Some(pos)
    }

    pub fn to_char(self) -> char {
        match self {
            Digit0 => '0',
            Digit1 => '1',
            Digit2 => '2',
            Digit3 => '3',
            Digit4 => '4',
            Digit5 => '5',
            Digit6 => '6',
            Digit7 => '7',
            Digit8 => '8',
            Digit9 => '9',
            Star => '*',
            Pound => '#',
            A => 'A',
            B => 'B',
            C => 'C',
            D => 'D',
            Space => ' ',
        }
    }

    /// Parse a keypad character. Letters are case-insensitive.
    pub fn from_char(ch: char) -> DtmfResult<Self> {
        let symbol = match ch.to_ascii_uppercase() {
            '0' => Digit0,
            '1' => Digit1,
            '2' => Digit2,
            '3' => Digit3,
            '4' => Digit4,
            '5' => Digit5,
            '6' => Digit6,
            '7' => Digit7,
            '8' => Digit8,
            '9' => Digit9,
            '*' => Star,
            '#' => Pound,
            'A' => A,
            'B' => B,
            'C' => C,
            'D' => D,
            ' ' => Space,
            _ => return Err(DtmfError::UnknownSymbol(ch)),
        };
        Ok(symbol)
    }
}

impl TryFrom<char> for DtmfSymbol {
    type Error = DtmfError;

    fn try_from(ch: char) -> DtmfResult<Self> {
        Self::from_char(ch)
    }
}

impl fmt::Display for DtmfSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Parse a dial string such as `"555 1234#"`
pub fn parse_symbols(text: &str) -> DtmfResult<Vec<DtmfSymbol>> {
    text.chars().map(DtmfSymbol::from_char).collect()
}

pub fn is_low_group(freq: u16) -> bool {
    LOW_GROUP.contains(&freq)
}

pub fn is_high_group(freq: u16) -> bool {
    HIGH_GROUP.contains(&freq)
}

/// Symbol for a tone pair. Silence maps back to `Space`.
pub fn lookup(pair: FrequencyPair) -> DtmfResult<DtmfSymbol> {
    if pair.is_silence() {
        return Ok(Space);
    }
    let row = LOW_GROUP.iter().position(|&f| f == pair.low);
    let col = HIGH_GROUP.iter().position(|&f| f == pair.high);
    match (row, col) {
        (Some(row), Some(col)) => Ok(KEYPAD[row][col]),
        _ => Err(DtmfError::UnknownFrequencyPair {
            low: pair.low,
            high: pair.high,
        }),
    }
}

/// Symbol for two tones given in either order.
/// One must be from the low group and the other from the high group.
pub fn lookup_tones(a: u16, b: u16) -> DtmfResult<DtmfSymbol> {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    if !is_low_group(low) || !is_high_group(high) {
        return Err(DtmfError::UnknownFrequencyPair { low, high });
    }
    lookup(FrequencyPair::new(low, high))
}
