//! GPIO port model (PINx / DDRx / PORTx).
//!
//! A pin configured as output reads back its PORT bit. A pin configured as
//! input reads the level forced onto it from outside, or its pull-up level
//! (the PORT bit) when nothing drives it. Writing a one to a PIN register bit
//! toggles the matching PORT bit.

use super::{ChangeSet, Peripheral, PortName};
use crate::cpu::CpuState;

/// Data-space addresses of a port's registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub name: PortName,
    pub pin: u16,
    pub ddr: u16,
    pub port: u16,
}

pub const PORT_B: PortConfig = PortConfig {
    name: PortName::B,
    pin: 0x23,
    ddr: 0x24,
    port: 0x25,
};

pub const PORT_C: PortConfig = PortConfig {
    name: PortName::C,
    pin: 0x26,
    ddr: 0x27,
    port: 0x28,
};

pub const PORT_D: PortConfig = PortConfig {
    name: PortName::D,
    pin: 0x29,
    ddr: 0x2A,
    port: 0x2B,
};

/// How a pin is configured by DDR and PORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Low,
    High,
    Input,
    InputPullUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoPort {
    config: PortConfig,
    /// Bits with an externally forced level.
    forced: u8,
    forced_levels: u8,
    /// Last computed pin levels, mirrored into the PIN register.
    levels: u8,
}

impl IoPort {
    pub fn new(config: PortConfig) -> Self {
        Self {
            config,
            forced: 0,
            forced_levels: 0,
            levels: 0,
        }
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn levels(&self) -> u8 {
        self.levels
    }

    pub fn level(&self, bit: u8) -> bool {
        self.levels & (1 << bit) != 0
    }

    pub fn pin_state(&self, cpu: &CpuState, bit: u8) -> PinState {
        let mask = 1 << bit;
        let output = cpu.peek(self.config.ddr) & mask != 0;
        let high = cpu.peek(self.config.port) & mask != 0;
        match (output, high) {
            (true, true) => PinState::High,
            (true, false) => PinState::Low,
            (false, true) => PinState::InputPullUp,
            (false, false) => PinState::Input,
        }
    }

    /// Forces `bit` to `level` as external wiring would, or releases it with
    /// `None`. Takes effect on the next `refresh` or tick.
    pub fn set_external(&mut self, bit: u8, level: Option<bool>) {
        let mask = 1 << bit;
        match level {
            Some(level) => {
                self.forced |= mask;
                if level {
                    self.forced_levels |= mask;
                } else {
                    self.forced_levels &= !mask;
                }
            }
            None => {
                self.forced &= !mask;
                self.forced_levels &= !mask;
            }
        }
    }

    /// Recomputes pin levels from the registers and writes them to PIN.
    pub fn refresh(&mut self, cpu: &mut CpuState) -> ChangeSet {
        let ddr = cpu.peek(self.config.ddr);
        let port = cpu.peek(self.config.port);
        let driven = ddr & port;
        let inputs = !ddr;
        let external = inputs & self.forced & self.forced_levels;
        let pulled_up = inputs & !self.forced & port;
        let levels = driven | external | pulled_up;

        cpu.poke(self.config.pin, levels);
        let mut changes = ChangeSet::default();
        changes.record(self.config.name, levels ^ self.levels, levels);
        self.levels = levels;
        changes
    }
}

impl Peripheral for IoPort {
    fn tick(&mut self, cpu: &mut CpuState) -> ChangeSet {
        if let Some(write) = cpu.io_write {
            if write.addr == self.config.pin && write.strobe != 0 {
                let port = cpu.peek(self.config.port);
                cpu.poke(self.config.port, port ^ write.strobe);
            }
        }
        self.refresh(cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding as asm;
    use crate::peripherals::PinId;

    fn step(cpu: &mut CpuState, port: &mut IoPort) -> ChangeSet {
        assert!(cpu.step().fault().is_none());
        port.tick(cpu)
    }

    #[test]
    fn test_output_pin_follows_port_register() {
        let mut cpu = CpuState::new(&[
            asm::sbi(0x04, 5), // DDRB5 = output
            asm::sbi(0x05, 5),
            asm::cbi(0x05, 5),
        ]);
        let mut port = IoPort::new(PORT_B);
        assert!(step(&mut cpu, &mut port).is_empty());

        let changes = step(&mut cpu, &mut port);
        assert_eq!(changes.level(PinId::new(PortName::B, 5)), Some(true));
        assert_eq!(cpu.peek(PORT_B.pin), 0x20);
        assert_eq!(port.pin_state(&cpu, 5), PinState::High);

        let changes = step(&mut cpu, &mut port);
        assert_eq!(changes.level(PinId::new(PortName::B, 5)), Some(false));
    }

    #[test]
    fn test_pin_write_toggles_port() {
        let mut cpu = CpuState::new(&[
            asm::ldi(16, 0x01),
            asm::out(0x0A, 16), // DDRD0 = output
            asm::out(0x09, 16), // PIND0 <- 1 toggles PORTD0
            asm::out(0x09, 16),
        ]);
        let mut port = IoPort::new(PORT_D);
        step(&mut cpu, &mut port);
        step(&mut cpu, &mut port);
        step(&mut cpu, &mut port);
        assert!(port.level(0));
        assert_eq!(cpu.peek(PORT_D.port), 0x01);
        step(&mut cpu, &mut port);
        assert!(!port.level(0));
    }

    #[test]
    fn test_external_level_only_affects_inputs() {
        let mut cpu = CpuState::new(&[asm::nop(), asm::sbi(0x0A, 2), asm::nop()]);
        let mut port = IoPort::new(PORT_D);
        port.set_external(2, Some(true));
        let changes = step(&mut cpu, &mut port);
        assert_eq!(changes.level(PinId::new(PortName::D, 2)), Some(true));
        assert_eq!(cpu.peek(PORT_D.pin) & 0x04, 0x04);

        // Once the program drives the pin low, the forced level no longer wins.
        step(&mut cpu, &mut port);
        assert!(!port.level(2));

        port.set_external(2, None);
        step(&mut cpu, &mut port);
        assert!(!port.level(2));
    }

    #[test]
    fn test_pull_up_reads_high_until_forced_low() {
        let mut cpu = CpuState::new(&[asm::sbi(0x0B, 2), asm::nop()]);
        let mut port = IoPort::new(PORT_D);
        step(&mut cpu, &mut port);
        assert_eq!(port.pin_state(&cpu, 2), PinState::InputPullUp);
        assert!(port.level(2));

        port.set_external(2, Some(false));
        let changes = port.refresh(&mut cpu);
        assert_eq!(changes.level(PinId::new(PortName::D, 2)), Some(false));
    }
}
