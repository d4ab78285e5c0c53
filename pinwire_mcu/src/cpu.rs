//! CPU state and the fetch/decode/execute step.
//!
//! `CpuState` owns program memory and the whole data space (registers, I/O
//! registers and SRAM). Peripherals observe the CPU through `io_write`, which
//! records the I/O register write made by the most recent instruction, and
//! raise interrupts through `request_interrupt`.

use crate::instruction::decode;
use crate::{DATA_SIZE, FLASH_WORDS, IO_END, IO_START, RAMEND, SPH_ADDR, SPL_ADDR, SREG_ADDR};
use thiserror::Error;

pub const SREG_C: u8 = 0;
pub const SREG_Z: u8 = 1;
pub const SREG_N: u8 = 2;
pub const SREG_V: u8 = 3;
pub const SREG_S: u8 = 4;
pub const SREG_H: u8 = 5;
pub const SREG_T: u8 = 6;
pub const SREG_I: u8 = 7;

/// Cycles spent entering an interrupt handler.
const INTERRUPT_CYCLES: u8 = 4;

/// An I/O register write performed by the last executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoWrite {
    /// Data-space address of the register.
    pub addr: u16,
    pub value: u8,
    /// Register content before the write.
    pub previous: u8,
    /// Bits the instruction wrote a one to. Equal to `value` for full-byte
    /// writes; only the addressed bit for SBI, nothing for CBI.
    pub strobe: u8,
}

/// An interrupt a peripheral wants serviced before the next instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptRequest {
    /// Vector number; lower numbers have higher priority.
    pub vector: u8,
    /// Flag register cleared by hardware when the handler is entered.
    pub flag_addr: u16,
    pub flag_mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuFault {
    #[error("invalid opcode {opcode:#06x} at {pc:#06x}")]
    InvalidOpcode { pc: u16, opcode: u16 },
    #[error("data access at {addr:#06x} outside data space (pc {pc:#06x})")]
    DataOutOfRange { pc: u16, addr: u16 },
}

/// Result of one `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed { cycles: u8 },
    /// An interrupt handler was entered instead of executing an instruction.
    Interrupted { vector: u8, cycles: u8 },
    Fault(CpuFault),
}

impl StepOutcome {
    pub fn fault(&self) -> Option<CpuFault> {
        match self {
            StepOutcome::Fault(fault) => Some(*fault),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuState {
    /// Program counter as a word address.
    pub pc: u16,
    /// Total cycles executed since reset.
    pub cycles: u64,
    pub io_write: Option<IoWrite>,
    pub pending_interrupt: Option<InterruptRequest>,
    program: Box<[u16]>,
    data: Box<[u8]>,
    fault: Option<CpuFault>,
    current_pc: u16,
}

impl CpuState {
    /// Creates a CPU in reset state with `program` at address 0. Flash beyond
    /// the program reads as erased (0xFFFF).
    pub fn new(program: &[u16]) -> Self {
        let mut flash = vec![0xFFFF; FLASH_WORDS].into_boxed_slice();
        let len = program.len().min(FLASH_WORDS);
        flash[..len].copy_from_slice(&program[..len]);
        let mut cpu = Self {
            pc: 0,
            cycles: 0,
            io_write: None,
            pending_interrupt: None,
            program: flash,
            data: vec![0; DATA_SIZE].into_boxed_slice(),
            fault: None,
            current_pc: 0,
        };
        cpu.set_sp(RAMEND);
        cpu
    }

    /// Executes one instruction, or enters a pending interrupt if the global
    /// interrupt flag is set.
    pub fn step(&mut self) -> StepOutcome {
        self.io_write = None;
        if let Some(request) = self.pending_interrupt.take() {
            if self.flag(SREG_I) {
                return self.enter_interrupt(request);
            }
        }

        let pc = self.pc;
        self.current_pc = pc;
        let opcode = self.fetch(pc);
        let Some(instruction) = decode(opcode, self.fetch(pc.wrapping_add(1))) else {
            return StepOutcome::Fault(CpuFault::InvalidOpcode { pc, opcode });
        };
        self.pc = wrap_pc(pc as i32 + instruction.words() as i32);
        let cycles = self.execute(instruction);
        self.cycles += cycles as u64;
        match self.fault.take() {
            Some(fault) => StepOutcome::Fault(fault),
            None => StepOutcome::Executed { cycles },
        }
    }

    fn enter_interrupt(&mut self, request: InterruptRequest) -> StepOutcome {
        self.current_pc = self.pc;
        let flags = self.peek(request.flag_addr);
        self.poke(request.flag_addr, flags & !request.flag_mask);
        self.push_pc(self.pc);
        self.set_flag(SREG_I, false);
        self.pc = wrap_pc(request.vector as i32 * 2);
        self.cycles += INTERRUPT_CYCLES as u64;
        match self.fault.take() {
            Some(fault) => StepOutcome::Fault(fault),
            None => StepOutcome::Interrupted {
                vector: request.vector,
                cycles: INTERRUPT_CYCLES,
            },
        }
    }

    /// Queues an interrupt for the next step, keeping whichever pending
    /// request has the higher priority.
    pub fn request_interrupt(&mut self, request: InterruptRequest) {
        match self.pending_interrupt {
            Some(pending) if pending.vector <= request.vector => {}
            _ => self.pending_interrupt = Some(request),
        }
    }

    pub fn fetch(&self, word_addr: u16) -> u16 {
        self.program[word_addr as usize % self.program.len()]
    }

    /// Reads a program memory byte (LPM addressing).
    pub fn program_byte(&self, byte_addr: u16) -> u8 {
        let word = self.fetch(byte_addr >> 1);
        if byte_addr & 1 == 0 {
            word as u8
        } else {
            (word >> 8) as u8
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw data-space read with no side effects. Out-of-range reads yield 0.
    pub fn peek(&self, addr: u16) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or(0)
    }

    /// Raw data-space write used by peripherals. Does not record an I/O write.
    pub fn poke(&mut self, addr: u16, value: u8) {
        if let Some(slot) = self.data.get_mut(addr as usize) {
            *slot = value;
        }
    }

    /// Instruction-level data read. Out-of-range addresses latch a fault.
    pub fn read_data(&mut self, addr: u16) -> u8 {
        match self.data.get(addr as usize) {
            Some(value) => *value,
            None => {
                self.latch_fault(addr);
                0
            }
        }
    }

    /// Instruction-level data write. Writes into the I/O range are recorded
    /// in `io_write` for the peripherals.
    pub fn write_data(&mut self, addr: u16, value: u8) {
        self.write_with_strobe(addr, value, value);
    }

    /// Single-bit I/O write as performed by SBI/CBI.
    pub fn write_io_bit(&mut self, addr: u16, bit: u8, level: bool) {
        let mask = 1u8 << bit;
        let previous = self.read_data(addr);
        let value = if level { previous | mask } else { previous & !mask };
        self.write_with_strobe(addr, value, if level { mask } else { 0 });
    }

    fn write_with_strobe(&mut self, addr: u16, value: u8, strobe: u8) {
        let Some(slot) = self.data.get_mut(addr as usize) else {
            self.latch_fault(addr);
            return;
        };
        let previous = *slot;
        *slot = value;
        if (IO_START..IO_END).contains(&addr) {
            self.io_write = Some(IoWrite {
                addr,
                value,
                previous,
                strobe,
            });
        }
    }

    fn latch_fault(&mut self, addr: u16) {
        if self.fault.is_none() {
            self.fault = Some(CpuFault::DataOutOfRange {
                pc: self.current_pc,
                addr,
            });
        }
    }

    pub fn reg(&self, r: u8) -> u8 {
        self.data[r as usize & 0x1F]
    }

    pub fn set_reg(&mut self, r: u8, value: u8) {
        self.data[r as usize & 0x1F] = value;
    }

    /// Little-endian register pair starting at `r`.
    pub fn reg_pair(&self, r: u8) -> u16 {
        u16::from_le_bytes([self.reg(r), self.reg(r + 1)])
    }

    pub fn set_reg_pair(&mut self, r: u8, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.set_reg(r, lo);
        self.set_reg(r + 1, hi);
    }

    pub fn sreg(&self) -> u8 {
        self.data[SREG_ADDR as usize]
    }

    pub fn flag(&self, bit: u8) -> bool {
        self.sreg() & (1 << bit) != 0
    }

    pub fn set_flag(&mut self, bit: u8, set: bool) {
        let sreg = &mut self.data[SREG_ADDR as usize];
        if set {
            *sreg |= 1 << bit;
        } else {
            *sreg &= !(1 << bit);
        }
    }

    pub fn sp(&self) -> u16 {
        u16::from_le_bytes([self.peek(SPL_ADDR), self.peek(SPH_ADDR)])
    }

    pub fn set_sp(&mut self, sp: u16) {
        let [lo, hi] = sp.to_le_bytes();
        self.poke(SPL_ADDR, lo);
        self.poke(SPH_ADDR, hi);
    }

    pub fn push(&mut self, value: u8) {
        let sp = self.sp();
        self.write_data(sp, value);
        self.set_sp(sp.wrapping_sub(1));
    }

    pub fn pop(&mut self) -> u8 {
        let sp = self.sp().wrapping_add(1);
        self.set_sp(sp);
        self.read_data(sp)
    }

    /// Pushes a return address, low byte first, as CALL does.
    pub fn push_pc(&mut self, pc: u16) {
        let [lo, hi] = pc.to_le_bytes();
        self.push(lo);
        self.push(hi);
    }

    pub fn pop_pc(&mut self) -> u16 {
        let hi = self.pop();
        let lo = self.pop();
        u16::from_le_bytes([lo, hi])
    }
}

/// Reduces a possibly negative word address into program memory.
pub(crate) fn wrap_pc(addr: i32) -> u16 {
    addr.rem_euclid(FLASH_WORDS as i32) as u16
}
