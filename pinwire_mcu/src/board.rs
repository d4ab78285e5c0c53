//! An ATmega328P wired as an Arduino Uno: CPU, ports B/C/D and timer0.
//!
//! Digital pins 0-7 map to PD0-PD7, 8-13 to PB0-PB5 and 14-19 (A0-A5) to
//! PC0-PC5.

use crate::cpu::{CpuFault, CpuState, StepOutcome};
use crate::hex::ExecutableImage;
use crate::peripherals::{
    ChangeSet, IoPort, Peripheral, PinId, PinState, PortName, Timer8, PORT_B, PORT_C, PORT_D,
    TIMER0,
};
use pinwire_shared::PinStateSnapshot;
use thiserror::Error;

/// Highest Arduino pin number wired to a port.
pub const MAX_PIN: u8 = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum McuError {
    #[error("pin {0} is not wired to an I/O port")]
    InvalidPin(i64),
}

/// Port and bit behind an Arduino digital pin number.
pub fn pin_location(pin: u8) -> Option<PinId> {
    match pin {
        0..=7 => Some(PinId::new(PortName::D, pin)),
        8..=13 => Some(PinId::new(PortName::B, pin - 8)),
        14..=19 => Some(PinId::new(PortName::C, pin - 14)),
        _ => None,
    }
}

/// Inverse of [`pin_location`].
pub fn arduino_pin(id: PinId) -> Option<u8> {
    match (id.port, id.bit) {
        (PortName::D, bit @ 0..=7) => Some(bit),
        (PortName::B, bit @ 0..=5) => Some(bit + 8),
        (PortName::C, bit @ 0..=5) => Some(bit + 14),
        _ => None,
    }
}

/// Outcome of a run of consecutive steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstReport {
    /// Steps completed (interrupt entries count as steps).
    pub steps: u64,
    pub cycles: u64,
    /// Accumulated pin changes over the burst.
    pub changes: ChangeSet,
    /// Set when the burst ended early on a fault.
    pub fault: Option<CpuFault>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cpu: CpuState,
    ports: [IoPort; 3],
    timer0: Timer8,
}

impl Board {
    pub fn new(image: &ExecutableImage) -> Self {
        Self {
            cpu: CpuState::new(image.words()),
            ports: [IoPort::new(PORT_B), IoPort::new(PORT_C), IoPort::new(PORT_D)],
            timer0: Timer8::new(TIMER0),
        }
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    pub fn port(&self, name: PortName) -> &IoPort {
        &self.ports[name.index()]
    }

    pub fn timer0(&self) -> &Timer8 {
        &self.timer0
    }

    /// Executes one CPU step then ticks every peripheral exactly once. A
    /// faulting step leaves the peripherals untouched.
    pub fn step(&mut self) -> (StepOutcome, ChangeSet) {
        let outcome = self.cpu.step();
        let mut changes = ChangeSet::default();
        if outcome.fault().is_some() {
            return (outcome, changes);
        }
        for port in &mut self.ports {
            changes.merge(port.tick(&mut self.cpu));
        }
        changes.merge(self.timer0.tick(&mut self.cpu));
        (outcome, changes)
    }

    /// Runs up to `max_steps` steps, stopping early on a fault.
    pub fn run_burst(&mut self, max_steps: u64) -> BurstReport {
        let start_cycles = self.cpu.cycles;
        let mut report = BurstReport {
            steps: 0,
            cycles: 0,
            changes: ChangeSet::default(),
            fault: None,
        };
        while report.steps < max_steps {
            let (outcome, changes) = self.step();
            if let Some(fault) = outcome.fault() {
                tracing::debug!(%fault, pc = self.cpu.pc, "CPU fault ends burst");
                report.fault = Some(fault);
                break;
            }
            report.changes.merge(changes);
            report.steps += 1;
        }
        report.cycles = self.cpu.cycles - start_cycles;
        report
    }

    /// Drives `pin` from outside the chip. Only pins configured as inputs
    /// read the forced level; the level is remembered if the program later
    /// switches the pin to input.
    pub fn set_input(&mut self, pin: u8, level: bool) -> Result<ChangeSet, McuError> {
        let id = pin_location(pin).ok_or(McuError::InvalidPin(pin as i64))?;
        let port = &mut self.ports[id.port.index()];
        port.set_external(id.bit, Some(level));
        Ok(port.refresh(&mut self.cpu))
    }

    pub fn pin_level(&self, pin: u8) -> Option<bool> {
        let id = pin_location(pin)?;
        Some(self.ports[id.port.index()].level(id.bit))
    }

    pub fn pin_state(&self, pin: u8) -> Option<PinState> {
        let id = pin_location(pin)?;
        Some(self.ports[id.port.index()].pin_state(&self.cpu, id.bit))
    }

    /// Levels of the listed pins. Pin numbers that are not wired are skipped.
    pub fn snapshot(&self, pins: &[u8]) -> PinStateSnapshot {
        pins.iter()
            .filter_map(|&pin| self.pin_level(pin).map(|level| (pin, level)))
            .collect()
    }

    /// Emulated time since reset at `clock_hz`.
    pub fn emulated_ms(&self, clock_hz: u32) -> f64 {
        if clock_hz == 0 {
            return 0.0;
        }
        self.cpu.cycles as f64 * 1000.0 / clock_hz as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding as asm;

    fn board(words: &[u16]) -> Board {
        Board::new(&ExecutableImage::from_bytes(&asm::words_to_bytes(words)))
    }

    #[test]
    fn test_pin_mapping_round_trips() {
        for pin in 0..=MAX_PIN {
            let id = pin_location(pin).unwrap();
            assert_eq!(arduino_pin(id), Some(pin));
        }
        assert_eq!(pin_location(13), Some(PinId::new(PortName::B, 5)));
        assert_eq!(pin_location(20), None);
        assert_eq!(arduino_pin(PinId::new(PortName::B, 6)), None);
    }

    #[test]
    fn test_burst_stops_at_fault() {
        let mut board = board(&[asm::nop(), asm::nop(), 0xFFFF]);
        let report = board.run_burst(100);
        assert_eq!(report.steps, 2);
        assert_eq!(report.cycles, 2);
        assert!(matches!(report.fault, Some(CpuFault::InvalidOpcode { pc: 2, .. })));
    }

    #[test]
    fn test_burst_accumulates_pin_changes() {
        let mut board = board(&[asm::sbi(0x04, 5), asm::sbi(0x05, 5), asm::rjmp(-1)]);
        let report = board.run_burst(10);
        assert_eq!(report.steps, 10);
        assert_eq!(report.changes.level(PinId::new(PortName::B, 5)), Some(true));
        assert_eq!(board.pin_level(13), Some(true));
        assert_eq!(board.pin_state(13), Some(PinState::High));
    }

    #[test]
    fn test_set_input_rejects_unwired_pins() {
        let mut board = board(&[asm::rjmp(-1)]);
        assert_eq!(board.set_input(20, true), Err(McuError::InvalidPin(20)));
        let changes = board.set_input(2, true).unwrap();
        assert_eq!(changes.level(PinId::new(PortName::D, 2)), Some(true));
        assert_eq!(board.cpu().peek(PORT_D.pin), 0x04);
    }

    #[test]
    fn test_snapshot_skips_unwired_pins() {
        let board = board(&[asm::rjmp(-1)]);
        let snapshot = board.snapshot(&[0, 13, 42]);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(13), Some(false));
        assert!(!snapshot.contains(42));
    }

    #[test]
    fn test_emulated_time() {
        let mut board = board(&[asm::rjmp(-1)]);
        board.run_burst(8_000);
        assert_eq!(board.cycles(), 16_000);
        assert!((board.emulated_ms(16_000_000) - 1.0).abs() < f64::EPSILON);
    }
}
