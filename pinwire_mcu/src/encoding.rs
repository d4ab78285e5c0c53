//! Opcode encoders for hand-assembling small programs.
//!
//! Only the forms needed to write test firmware and benchmarks are provided.
//! Branch offsets are in words relative to the following instruction.

pub const fn nop() -> u16 {
    0x0000
}

const fn two_reg(base: u16, d: u8, r: u8) -> u16 {
    base | ((r as u16 & 0x10) << 5) | ((d as u16 & 0x1F) << 4) | (r as u16 & 0x0F)
}

const fn reg_imm(base: u16, d: u8, k: u8) -> u16 {
    base | ((k as u16 & 0xF0) << 4) | (((d - 16) as u16 & 0x0F) << 4) | (k as u16 & 0x0F)
}

const fn one_reg(low: u16, d: u8) -> u16 {
    0x9400 | ((d as u16 & 0x1F) << 4) | low
}

pub const fn add(d: u8, r: u8) -> u16 {
    two_reg(0x0C00, d, r)
}

pub const fn adc(d: u8, r: u8) -> u16 {
    two_reg(0x1C00, d, r)
}

pub const fn sub(d: u8, r: u8) -> u16 {
    two_reg(0x1800, d, r)
}

pub const fn sbc(d: u8, r: u8) -> u16 {
    two_reg(0x0800, d, r)
}

pub const fn cp(d: u8, r: u8) -> u16 {
    two_reg(0x1400, d, r)
}

pub const fn cpc(d: u8, r: u8) -> u16 {
    two_reg(0x0400, d, r)
}

pub const fn cpse(d: u8, r: u8) -> u16 {
    two_reg(0x1000, d, r)
}

pub const fn and(d: u8, r: u8) -> u16 {
    two_reg(0x2000, d, r)
}

pub const fn eor(d: u8, r: u8) -> u16 {
    two_reg(0x2400, d, r)
}

pub const fn or(d: u8, r: u8) -> u16 {
    two_reg(0x2800, d, r)
}

pub const fn mov(d: u8, r: u8) -> u16 {
    two_reg(0x2C00, d, r)
}

pub const fn mul(d: u8, r: u8) -> u16 {
    two_reg(0x9C00, d, r)
}

/// `d` must be r16..r31.
pub const fn ldi(d: u8, k: u8) -> u16 {
    reg_imm(0xE000, d, k)
}

pub const fn subi(d: u8, k: u8) -> u16 {
    reg_imm(0x5000, d, k)
}

pub const fn sbci(d: u8, k: u8) -> u16 {
    reg_imm(0x4000, d, k)
}

pub const fn cpi(d: u8, k: u8) -> u16 {
    reg_imm(0x3000, d, k)
}

pub const fn andi(d: u8, k: u8) -> u16 {
    reg_imm(0x7000, d, k)
}

pub const fn ori(d: u8, k: u8) -> u16 {
    reg_imm(0x6000, d, k)
}

pub const fn com(d: u8) -> u16 {
    one_reg(0x0, d)
}

pub const fn neg(d: u8) -> u16 {
    one_reg(0x1, d)
}

pub const fn inc(d: u8) -> u16 {
    one_reg(0x3, d)
}

pub const fn asr(d: u8) -> u16 {
    one_reg(0x5, d)
}

pub const fn lsr(d: u8) -> u16 {
    one_reg(0x6, d)
}

pub const fn ror(d: u8) -> u16 {
    one_reg(0x7, d)
}

pub const fn dec(d: u8) -> u16 {
    one_reg(0xA, d)
}

pub const fn push(r: u8) -> u16 {
    0x920F | ((r as u16 & 0x1F) << 4)
}

pub const fn pop(d: u8) -> u16 {
    0x900F | ((d as u16 & 0x1F) << 4)
}

/// `d` must be r24, r26, r28 or r30.
pub const fn adiw(d: u8, k: u8) -> u16 {
    0x9600 | ((k as u16 & 0x30) << 2) | ((((d - 24) / 2) as u16) << 4) | (k as u16 & 0x0F)
}

pub const fn sbiw(d: u8, k: u8) -> u16 {
    adiw(d, k) | 0x0100
}

pub const fn in_(d: u8, a: u8) -> u16 {
    0xB000 | ((a as u16 & 0x30) << 5) | ((d as u16 & 0x1F) << 4) | (a as u16 & 0x0F)
}

pub const fn out(a: u8, r: u8) -> u16 {
    in_(r, a) | 0x0800
}

const fn io_bit(base: u16, a: u8, b: u8) -> u16 {
    base | ((a as u16 & 0x1F) << 3) | (b as u16 & 0x07)
}

pub const fn cbi(a: u8, b: u8) -> u16 {
    io_bit(0x9800, a, b)
}

pub const fn sbic(a: u8, b: u8) -> u16 {
    io_bit(0x9900, a, b)
}

pub const fn sbi(a: u8, b: u8) -> u16 {
    io_bit(0x9A00, a, b)
}

pub const fn sbis(a: u8, b: u8) -> u16 {
    io_bit(0x9B00, a, b)
}

pub const fn rjmp(k: i16) -> u16 {
    0xC000 | (k as u16 & 0x0FFF)
}

pub const fn rcall(k: i16) -> u16 {
    0xD000 | (k as u16 & 0x0FFF)
}

pub const fn brbs(s: u8, k: i8) -> u16 {
    0xF000 | ((k as u16 & 0x7F) << 3) | (s as u16 & 0x07)
}

pub const fn brbc(s: u8, k: i8) -> u16 {
    0xF400 | ((k as u16 & 0x7F) << 3) | (s as u16 & 0x07)
}

pub const fn breq(k: i8) -> u16 {
    brbs(1, k)
}

pub const fn brne(k: i8) -> u16 {
    brbc(1, k)
}

pub const fn sei() -> u16 {
    0x9478
}

pub const fn cli() -> u16 {
    0x94F8
}

pub const fn ret() -> u16 {
    0x9508
}

pub const fn reti() -> u16 {
    0x9518
}

const fn long_jump(base: u16, k: u32) -> [u16; 2] {
    [
        base | ((((k >> 17) & 0x1F) as u16) << 4) | ((k >> 16) & 0x01) as u16,
        k as u16,
    ]
}

pub const fn jmp(k: u32) -> [u16; 2] {
    long_jump(0x940C, k)
}

pub const fn call(k: u32) -> [u16; 2] {
    long_jump(0x940E, k)
}

pub const fn lds(d: u8, k: u16) -> [u16; 2] {
    [0x9000 | ((d as u16 & 0x1F) << 4), k]
}

pub const fn sts(k: u16, r: u8) -> [u16; 2] {
    [0x9200 | ((r as u16 & 0x1F) << 4), k]
}

/// Flattens program words into little-endian flash bytes.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Assembles words straight into an Intel HEX image.
pub fn words_to_hex(words: &[u16]) -> String {
    crate::hex::to_intel_hex(&words_to_bytes(words))
}
