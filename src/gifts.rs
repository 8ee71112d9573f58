//! Gift-name to coin-value conversion.
//!
//! Providers describe gifts by name; gameplay only cares about their coin
//! value. [`GiftTable`] holds the mapping, either the built-in snapshot of
//! common gifts or one loaded from a `name,coins` CSV export.

use std::collections::HashMap;

use crate::error::{ArenaError, Result};

/// Built-in gift values (coins), a snapshot of the provider's US catalog.
const BUILTIN_GIFTS: &[(&str, f64)] = &[
    ("Rose", 1.0),
    ("TikTok", 1.0),
    ("Ice Cream Cone", 1.0),
    ("GG", 1.0),
    ("Finger Heart", 5.0),
    ("Perfume", 20.0),
    ("Doughnut", 30.0),
    ("Paper Crane", 99.0),
    ("Hand Hearts", 100.0),
    ("Confetti", 100.0),
    ("Corgi", 299.0),
    ("Money Gun", 500.0),
    ("Galaxy", 1_000.0),
    ("Chasing the Dream", 1_500.0),
    ("Drama Queen", 5_000.0),
    ("Lion", 29_999.0),
    ("TikTok Universe", 44_999.0),
];

/// Lookup table from gift name to coin value.
///
/// Unknown gifts are worth zero — new catalog entries should degrade to "no
/// gameplay effect", not to an error.
///
/// # Example
///
/// ```
/// use stream_arena::gifts::GiftTable;
///
/// let table = GiftTable::builtin();
/// assert_eq!(table.coins("Rose"), 1.0);
/// assert_eq!(table.coins("Mystery Box"), 0.0);
/// assert_eq!(table.gift_coins("Rose", 5), 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct GiftTable {
    values: HashMap<String, f64>,
}

impl GiftTable {
    /// The built-in gift catalog.
    pub fn builtin() -> Self {
        Self {
            values: BUILTIN_GIFTS
                .iter()
                .map(|&(name, coins)| (name.to_string(), coins))
                .collect(),
        }
    }

    /// Parse a gift table from a CSV export with a `name,coins` header row.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::GiftTable`] if a row is missing its coin column
    /// or the coin value is not a number.
    pub fn from_csv(csv: &str) -> Result<Self> {
        let mut values = HashMap::new();
        for (idx, line) in csv.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (name, coins) = line
                .split_once(',')
                .ok_or_else(|| ArenaError::GiftTable(format!("line {}: missing coin column", idx + 1)))?;
            let coins: f64 = coins.trim().parse().map_err(|_| {
                ArenaError::GiftTable(format!("line {}: invalid coin value {coins:?}", idx + 1))
            })?;
            values.insert(name.trim().to_string(), coins);
        }
        Ok(Self { values })
    }

    /// Coin value of a single gift, or 0 for unknown gifts.
    pub fn coins(&self, gift_name: &str) -> f64 {
        self.values.get(gift_name).copied().unwrap_or(0.0)
    }

    /// Coin value of a gift repeated `repeat_count` times.
    pub fn gift_coins(&self, gift_name: &str, repeat_count: u32) -> f64 {
        self.coins(gift_name) * f64::from(repeat_count)
    }

    /// Number of known gifts.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for GiftTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
