//! Pin level snapshots as seen by observers.
//!
//! A snapshot maps Arduino digital pin numbers to their logical level. It
//! serializes as a flat JSON object keyed `pin0`, `pin1`, ... in ascending pin
//! order, so two equal snapshots always produce byte-identical JSON.

use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Complete level state of every observed pin at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinStateSnapshot {
    levels: BTreeMap<u8, bool>,
}

impl PinStateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot with every listed pin low.
    pub fn all_low(pins: &[u8]) -> Self {
        pins.iter().map(|&pin| (pin, false)).collect()
    }

    /// Sets the level of `pin`, returning the previous level if it was tracked.
    pub fn set(&mut self, pin: u8, level: bool) -> Option<bool> {
        self.levels.insert(pin, level)
    }

    pub fn get(&self, pin: u8) -> Option<bool> {
        self.levels.get(&pin).copied()
    }

    pub fn contains(&self, pin: u8) -> bool {
        self.levels.contains_key(&pin)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, bool)> + '_ {
        self.levels.iter().map(|(&pin, &level)| (pin, level))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Pins whose level differs between `self` and `other`, including pins
    /// tracked by only one side.
    pub fn changed_pins(&self, other: &Self) -> Vec<u8> {
        let pins: BTreeSet<u8> = self
            .levels
            .keys()
            .chain(other.levels.keys())
            .copied()
            .filter(|&pin| self.get(pin) != other.get(pin))
            .collect();
        pins.into_iter().collect()
    }
}

impl FromIterator<(u8, bool)> for PinStateSnapshot {
    fn from_iter<T: IntoIterator<Item = (u8, bool)>>(iter: T) -> Self {
        Self {
            levels: iter.into_iter().collect(),
        }
    }
}

/// JSON key used for a pin, e.g. `pin13`.
pub fn pin_key(pin: u8) -> String {
    format!("pin{pin}")
}

/// Inverse of [`pin_key`].
pub fn parse_pin_key(key: &str) -> Option<u8> {
    let digits = key.strip_prefix("pin")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl Serialize for PinStateSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.levels.len()))?;
        for (pin, level) in self.iter() {
            map.serialize_entry(&pin_key(pin), &level)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PinStateSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = PinStateSnapshot;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of `pinN` keys to booleans")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut snapshot = PinStateSnapshot::new();
                while let Some(key) = access.next_key::<String>()? {
                    let pin = parse_pin_key(&key)
                        .ok_or_else(|| de::Error::custom(format!("unexpected key `{key}`")))?;
                    snapshot.set(pin, access.next_value()?);
                }
                Ok(snapshot)
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}
