//! Opcode decoding for the ATmega328P instruction set.
//!
//! Register operands are stored as register numbers (0..=31), I/O operands as
//! I/O addresses (add 0x20 for the data-space address) and branch offsets in
//! words relative to the following instruction.

/// Pointer register pair used by indirect loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    X,
    Y,
    Z,
}

impl Pointer {
    /// Number of the low register of the pair.
    pub const fn low_register(self) -> u8 {
        match self {
            Pointer::X => 26,
            Pointer::Y => 28,
            Pointer::Z => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Plain,
    PostIncrement,
    PreDecrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Movw { d: u8, r: u8 },
    Muls { d: u8, r: u8 },
    Mulsu { d: u8, r: u8 },
    Fmul { d: u8, r: u8 },
    Fmuls { d: u8, r: u8 },
    Fmulsu { d: u8, r: u8 },
    Cpc { d: u8, r: u8 },
    Sbc { d: u8, r: u8 },
    Add { d: u8, r: u8 },
    Cpse { d: u8, r: u8 },
    Cp { d: u8, r: u8 },
    Sub { d: u8, r: u8 },
    Adc { d: u8, r: u8 },
    And { d: u8, r: u8 },
    Eor { d: u8, r: u8 },
    Or { d: u8, r: u8 },
    Mov { d: u8, r: u8 },
    Mul { d: u8, r: u8 },
    Cpi { d: u8, k: u8 },
    Sbci { d: u8, k: u8 },
    Subi { d: u8, k: u8 },
    Ori { d: u8, k: u8 },
    Andi { d: u8, k: u8 },
    Ldi { d: u8, k: u8 },
    Ld { d: u8, ptr: Pointer, mode: AddressMode },
    St { r: u8, ptr: Pointer, mode: AddressMode },
    Ldd { d: u8, ptr: Pointer, q: u8 },
    Std { r: u8, ptr: Pointer, q: u8 },
    Lds { d: u8, k: u16 },
    Sts { r: u8, k: u16 },
    Lpm { d: u8, post_increment: bool },
    Pop { d: u8 },
    Push { r: u8 },
    Com { d: u8 },
    Neg { d: u8 },
    Swap { d: u8 },
    Inc { d: u8 },
    Asr { d: u8 },
    Lsr { d: u8 },
    Ror { d: u8 },
    Dec { d: u8 },
    Adiw { d: u8, k: u8 },
    Sbiw { d: u8, k: u8 },
    Bset { s: u8 },
    Bclr { s: u8 },
    Bld { d: u8, b: u8 },
    Bst { d: u8, b: u8 },
    Sbrc { r: u8, b: u8 },
    Sbrs { r: u8, b: u8 },
    Cbi { a: u8, b: u8 },
    Sbi { a: u8, b: u8 },
    Sbic { a: u8, b: u8 },
    Sbis { a: u8, b: u8 },
    In { d: u8, a: u8 },
    Out { r: u8, a: u8 },
    Rjmp { k: i16 },
    Rcall { k: i16 },
    Jmp { k: u32 },
    Call { k: u32 },
    Ijmp,
    Icall,
    Ret,
    Reti,
    Brbs { s: u8, k: i8 },
    Brbc { s: u8, k: i8 },
    Sleep,
    Break,
    Wdr,
    Spm,
}

impl Instruction {
    /// Instruction length in program words.
    pub const fn words(&self) -> u16 {
        match self {
            Instruction::Jmp { .. }
            | Instruction::Call { .. }
            | Instruction::Lds { .. }
            | Instruction::Sts { .. } => 2,
            _ => 1,
        }
    }
}

/// True when `opcode` is the first word of a two-word instruction.
pub const fn is_two_word(opcode: u16) -> bool {
    let lds_sts = opcode & 0xFE0F;
    lds_sts == 0x9000 || lds_sts == 0x9200 || opcode & 0xFE0C == 0x940C
}

#[inline]
const fn rd5(op: u16) -> u8 {
    ((op >> 4) & 0x1F) as u8
}

#[inline]
const fn rr5(op: u16) -> u8 {
    ((op & 0x0F) | ((op >> 5) & 0x10)) as u8
}

#[inline]
const fn rd4(op: u16) -> u8 {
    16 + ((op >> 4) & 0x0F) as u8
}

#[inline]
const fn imm8(op: u16) -> u8 {
    (((op >> 4) & 0xF0) | (op & 0x0F)) as u8
}

/// Decodes the instruction at `opcode`. `next` is the following program word,
/// only consulted for two-word instructions. Returns `None` for encodings the
/// ATmega328P does not implement.
pub fn decode(opcode: u16, next: u16) -> Option<Instruction> {
    use Instruction::*;
    let op = opcode;
    let (d, r) = (rd5(op), rr5(op));

    let inst = match op >> 12 {
        0x0 => match op & 0x0C00 {
            0x0000 => match (op >> 8) & 0x03 {
                0 if op == 0 => Nop,
                0 => return None,
                1 => Movw {
                    d: ((op >> 4) & 0x0F) as u8 * 2,
                    r: (op & 0x0F) as u8 * 2,
                },
                2 => Muls {
                    d: rd4(op),
                    r: 16 + (op & 0x0F) as u8,
                },
                _ => {
                    let d = 16 + ((op >> 4) & 0x07) as u8;
                    let r = 16 + (op & 0x07) as u8;
                    match op & 0x88 {
                        0x00 => Mulsu { d, r },
                        0x08 => Fmul { d, r },
                        0x80 => Fmuls { d, r },
                        _ => Fmulsu { d, r },
                    }
                }
            },
            0x0400 => Cpc { d, r },
            0x0800 => Sbc { d, r },
            _ => Add { d, r },
        },
        0x1 => match op & 0x0C00 {
            0x0000 => Cpse { d, r },
            0x0400 => Cp { d, r },
            0x0800 => Sub { d, r },
            _ => Adc { d, r },
        },
        0x2 => match op & 0x0C00 {
            0x0000 => And { d, r },
            0x0400 => Eor { d, r },
            0x0800 => Or { d, r },
            _ => Mov { d, r },
        },
        0x3 => Cpi { d: rd4(op), k: imm8(op) },
        0x4 => Sbci { d: rd4(op), k: imm8(op) },
        0x5 => Subi { d: rd4(op), k: imm8(op) },
        0x6 => Ori { d: rd4(op), k: imm8(op) },
        0x7 => Andi { d: rd4(op), k: imm8(op) },
        0x8 | 0xA => {
            let q = (((op >> 8) & 0x20) | ((op >> 7) & 0x18) | (op & 0x07)) as u8;
            let ptr = if op & 0x0008 != 0 { Pointer::Y } else { Pointer::Z };
            let store = op & 0x0200 != 0;
            match (store, q) {
                (false, 0) => Ld { d, ptr, mode: AddressMode::Plain },
                (true, 0) => St { r: d, ptr, mode: AddressMode::Plain },
                (false, q) => Ldd { d, ptr, q },
                (true, q) => Std { r: d, ptr, q },
            }
        }
        0x9 => return decode_group9(op, next),
        0xB => {
            let a = (((op >> 5) & 0x30) | (op & 0x0F)) as u8;
            if op & 0x0800 == 0 { In { d, a } } else { Out { r: d, a } }
        }
        0xC => Rjmp { k: sign_extend_12(op) },
        0xD => Rcall { k: sign_extend_12(op) },
        0xE => Ldi { d: rd4(op), k: imm8(op) },
        _ => {
            let s = (op & 0x07) as u8;
            match (op >> 9) & 0x07 {
                0 | 1 => Brbs { s, k: sign_extend_7(op) },
                2 | 3 => Brbc { s, k: sign_extend_7(op) },
                _ if op & 0x0008 != 0 => return None,
                4 => Bld { d, b: s },
                5 => Bst { d, b: s },
                6 => Sbrc { r: d, b: s },
                _ => Sbrs { r: d, b: s },
            }
        }
    };
    Some(inst)
}

fn decode_group9(op: u16, next: u16) -> Option<Instruction> {
    use Instruction::*;
    let d = rd5(op);
    let inst = match op & 0x0E00 {
        0x0000 => match op & 0x000F {
            0x0 => Lds { d, k: next },
            0x1 => Ld { d, ptr: Pointer::Z, mode: AddressMode::PostIncrement },
            0x2 => Ld { d, ptr: Pointer::Z, mode: AddressMode::PreDecrement },
            0x4 => Lpm { d, post_increment: false },
            0x5 => Lpm { d, post_increment: true },
            0x9 => Ld { d, ptr: Pointer::Y, mode: AddressMode::PostIncrement },
            0xA => Ld { d, ptr: Pointer::Y, mode: AddressMode::PreDecrement },
            0xC => Ld { d, ptr: Pointer::X, mode: AddressMode::Plain },
            0xD => Ld { d, ptr: Pointer::X, mode: AddressMode::PostIncrement },
            0xE => Ld { d, ptr: Pointer::X, mode: AddressMode::PreDecrement },
            0xF => Pop { d },
            _ => return None,
        },
        0x0200 => match op & 0x000F {
            0x0 => Sts { r: d, k: next },
            0x1 => St { r: d, ptr: Pointer::Z, mode: AddressMode::PostIncrement },
            0x2 => St { r: d, ptr: Pointer::Z, mode: AddressMode::PreDecrement },
            0x9 => St { r: d, ptr: Pointer::Y, mode: AddressMode::PostIncrement },
            0xA => St { r: d, ptr: Pointer::Y, mode: AddressMode::PreDecrement },
            0xC => St { r: d, ptr: Pointer::X, mode: AddressMode::Plain },
            0xD => St { r: d, ptr: Pointer::X, mode: AddressMode::PostIncrement },
            0xE => St { r: d, ptr: Pointer::X, mode: AddressMode::PreDecrement },
            0xF => Push { r: d },
            _ => return None,
        },
        0x0400 => match op & 0x000F {
            0x0 => Com { d },
            0x1 => Neg { d },
            0x2 => Swap { d },
            0x3 => Inc { d },
            0x5 => Asr { d },
            0x6 => Lsr { d },
            0x7 => Ror { d },
            0xA => Dec { d },
            0x8 if op & 0x0100 == 0 => {
                let s = ((op >> 4) & 0x07) as u8;
                if op & 0x0080 == 0 { Bset { s } } else { Bclr { s } }
            }
            0x8 => match op {
                0x9508 => Ret,
                0x9518 => Reti,
                0x9588 => Sleep,
                0x9598 => Break,
                0x95A8 => Wdr,
                0x95C8 => Lpm { d: 0, post_increment: false },
                0x95E8 => Spm,
                _ => return None,
            },
            0x9 => match op {
                0x9409 => Ijmp,
                0x9509 => Icall,
                _ => return None,
            },
            0xC..=0xF => {
                let high = (((op >> 3) & 0x3E) | (op & 0x01)) as u32;
                let k = (high << 16) | next as u32;
                if op & 0x0002 == 0 { Jmp { k } } else { Call { k } }
            }
            _ => return None,
        },
        0x0600 => {
            let d = 24 + ((op >> 3) & 0x06) as u8;
            let k = (((op >> 2) & 0x30) | (op & 0x0F)) as u8;
            if op & 0x0100 == 0 { Adiw { d, k } } else { Sbiw { d, k } }
        }
        0x0800 | 0x0A00 => {
            let a = ((op >> 3) & 0x1F) as u8;
            let b = (op & 0x07) as u8;
            match (op >> 8) & 0x03 {
                0 => Cbi { a, b },
                1 => Sbic { a, b },
                2 => Sbi { a, b },
                _ => Sbis { a, b },
            }
        }
        _ => Mul { d, r: rr5(op) },
    };
    Some(inst)
}

fn sign_extend_12(op: u16) -> i16 {
    let k = (op & 0x0FFF) as i16;
    if k & 0x0800 != 0 { k - 0x1000 } else { k }
}

fn sign_extend_7(op: u16) -> i8 {
    let k = ((op >> 3) & 0x7F) as i16;
    (if k & 0x40 != 0 { k - 0x80 } else { k }) as i8
}
