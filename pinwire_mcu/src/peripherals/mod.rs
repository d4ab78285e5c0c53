//! Memory-mapped peripheral models.
//!
//! Each peripheral is ticked once after every CPU step, reads the CPU's
//! registers and pending I/O write, updates its own registers and reports
//! which pins changed level.

pub mod port;
pub mod timer;

pub use port::{IoPort, PinState, PortConfig, PORT_B, PORT_C, PORT_D};
pub use timer::{Timer8, TimerConfig, TIMER0};

use crate::cpu::CpuState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortName {
    B,
    C,
    D,
}

impl PortName {
    pub const ALL: [PortName; 3] = [PortName::B, PortName::C, PortName::D];

    pub const fn index(self) -> usize {
        match self {
            PortName::B => 0,
            PortName::C => 1,
            PortName::D => 2,
        }
    }
}

/// A physical pin: port and bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId {
    pub port: PortName,
    pub bit: u8,
}

impl PinId {
    pub const fn new(port: PortName, bit: u8) -> Self {
        Self { port, bit }
    }
}

/// Pins whose level changed during a tick, with their new levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changed: [u8; 3],
    levels: [u8; 3],
}

impl ChangeSet {
    /// Records the bits in `changed` of `port` as now reading `levels`.
    pub fn record(&mut self, port: PortName, changed: u8, levels: u8) {
        let i = port.index();
        self.changed[i] |= changed;
        self.levels[i] = (self.levels[i] & !changed) | (levels & changed);
    }

    /// Folds a later change set into this one.
    pub fn merge(&mut self, later: ChangeSet) {
        for port in PortName::ALL {
            let i = port.index();
            self.record(port, later.changed[i], later.levels[i]);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.iter().all(|mask| *mask == 0)
    }

    pub fn contains(&self, pin: PinId) -> bool {
        self.changed[pin.port.index()] & (1 << pin.bit) != 0
    }

    /// Level recorded for `pin`, if it changed.
    pub fn level(&self, pin: PinId) -> Option<bool> {
        self.contains(pin)
            .then(|| self.levels[pin.port.index()] & (1 << pin.bit) != 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PinId, bool)> + '_ {
        PortName::ALL.into_iter().flat_map(move |port| {
            (0..8u8)
                .map(move |bit| PinId::new(port, bit))
                .filter_map(move |pin| self.level(pin).map(|level| (pin, level)))
        })
    }
}

/// A device ticked once per CPU step.
pub trait Peripheral {
    fn tick(&mut self, cpu: &mut CpuState) -> ChangeSet;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_latest_level() {
        let mut first = ChangeSet::default();
        first.record(PortName::B, 0b0010_0000, 0b0010_0000);
        let mut second = ChangeSet::default();
        second.record(PortName::B, 0b0010_0000, 0);
        second.record(PortName::D, 0b0000_0100, 0b0000_0100);
        first.merge(second);

        let changes: Vec<_> = first.iter().collect();
        assert_eq!(
            changes,
            vec![(PinId::new(PortName::B, 5), false), (PinId::new(PortName::D, 2), true)]
        );
    }

    #[test]
    fn test_empty() {
        let mut set = ChangeSet::default();
        assert!(set.is_empty());
        set.record(PortName::C, 0, 0xFF);
        assert!(set.is_empty());
        set.record(PortName::C, 1, 0);
        assert!(!set.is_empty());
        assert_eq!(set.level(PinId::new(PortName::C, 0)), Some(false));
    }
}
