// pinwire_mcu: instruction-level ATmega328P emulation (CPU core, program loader,
// I/O ports and timer0). Everything here is synchronous and deterministic.

pub mod board;
pub mod cpu;
pub mod encoding;
mod execute;
pub mod hex;
pub mod instruction;
pub mod peripherals;

pub use board::{arduino_pin, pin_location, Board, BurstReport, McuError};
pub use cpu::{CpuFault, CpuState, InterruptRequest, IoWrite, StepOutcome};
pub use hex::{parse_intel_hex, to_intel_hex, ExecutableImage, ImageError};
pub use peripherals::{ChangeSet, Peripheral, PinId, PortName};

/// Program memory size in bytes (32 KiB flash).
pub const FLASH_BYTES: usize = 32 * 1024;
/// Program memory size in 16-bit words.
pub const FLASH_WORDS: usize = FLASH_BYTES / 2;
/// Data space: 32 registers, 64 I/O, 160 extended I/O, 2 KiB SRAM.
pub const DATA_SIZE: usize = 0x900;
/// Highest SRAM address; SP resets here.
pub const RAMEND: u16 = 0x08FF;
/// First and one-past-last data addresses of the I/O register file.
pub const IO_START: u16 = 0x20;
pub const IO_END: u16 = 0x100;

pub const SREG_ADDR: u16 = 0x5F;
pub const SPH_ADDR: u16 = 0x5E;
pub const SPL_ADDR: u16 = 0x5D;

/// Uno crystal frequency.
pub const DEFAULT_CLOCK_HZ: u32 = 16_000_000;
