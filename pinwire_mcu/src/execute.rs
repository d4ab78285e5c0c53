// Instruction semantics. `execute` runs after the program counter has been
// advanced past the instruction and returns the cycle count.

use crate::cpu::{wrap_pc, CpuState, SREG_C, SREG_H, SREG_I, SREG_N, SREG_S, SREG_T, SREG_V, SREG_Z};
use crate::instruction::{is_two_word, AddressMode, Instruction, Pointer};
use crate::IO_START;

impl CpuState {
    pub(crate) fn execute(&mut self, instruction: Instruction) -> u8 {
        use Instruction::*;
        match instruction {
            Nop | Sleep | Break | Wdr | Spm => 1,

            Movw { d, r } => {
                let value = self.reg_pair(r);
                self.set_reg_pair(d, value);
                1
            }
            Mov { d, r } => {
                self.set_reg(d, self.reg(r));
                1
            }
            Ldi { d, k } => {
                self.set_reg(d, k);
                1
            }

            Add { d, r } => {
                let result = self.add8(self.reg(d), self.reg(r), false);
                self.set_reg(d, result);
                1
            }
            Adc { d, r } => {
                let result = self.add8(self.reg(d), self.reg(r), self.flag(SREG_C));
                self.set_reg(d, result);
                1
            }
            Sub { d, r } => {
                let result = self.sub8(self.reg(d), self.reg(r), false, false);
                self.set_reg(d, result);
                1
            }
            Sbc { d, r } => {
                let result = self.sub8(self.reg(d), self.reg(r), self.flag(SREG_C), true);
                self.set_reg(d, result);
                1
            }
            Subi { d, k } => {
                let result = self.sub8(self.reg(d), k, false, false);
                self.set_reg(d, result);
                1
            }
            Sbci { d, k } => {
                let result = self.sub8(self.reg(d), k, self.flag(SREG_C), true);
                self.set_reg(d, result);
                1
            }
            Cp { d, r } => {
                self.sub8(self.reg(d), self.reg(r), false, false);
                1
            }
            Cpc { d, r } => {
                self.sub8(self.reg(d), self.reg(r), self.flag(SREG_C), true);
                1
            }
            Cpi { d, k } => {
                self.sub8(self.reg(d), k, false, false);
                1
            }
            Cpse { d, r } => {
                if self.reg(d) == self.reg(r) {
                    self.skip_next()
                } else {
                    1
                }
            }

            And { d, r } => self.logic(d, self.reg(d) & self.reg(r)),
            Andi { d, k } => self.logic(d, self.reg(d) & k),
            Or { d, r } => self.logic(d, self.reg(d) | self.reg(r)),
            Ori { d, k } => self.logic(d, self.reg(d) | k),
            Eor { d, r } => self.logic(d, self.reg(d) ^ self.reg(r)),

            Com { d } => {
                self.logic(d, !self.reg(d));
                self.set_flag(SREG_C, true);
                1
            }
            Neg { d } => {
                let value = self.reg(d);
                let result = 0u8.wrapping_sub(value);
                self.set_flag(SREG_H, (result | value) & 0x08 != 0);
                self.set_flag(SREG_C, result != 0);
                self.set_nvsz(result, result == 0x80);
                self.set_reg(d, result);
                1
            }
            Swap { d } => {
                self.set_reg(d, self.reg(d).rotate_left(4));
                1
            }
            Inc { d } => {
                let value = self.reg(d);
                let result = value.wrapping_add(1);
                self.set_nvsz(result, value == 0x7F);
                self.set_reg(d, result);
                1
            }
            Dec { d } => {
                let value = self.reg(d);
                let result = value.wrapping_sub(1);
                self.set_nvsz(result, value == 0x80);
                self.set_reg(d, result);
                1
            }
            Asr { d } => {
                let value = self.reg(d);
                self.shift(d, (value >> 1) | (value & 0x80), value & 1 != 0)
            }
            Lsr { d } => {
                let value = self.reg(d);
                self.shift(d, value >> 1, value & 1 != 0)
            }
            Ror { d } => {
                let value = self.reg(d);
                let carry_in = (self.flag(SREG_C) as u8) << 7;
                self.shift(d, (value >> 1) | carry_in, value & 1 != 0)
            }

            Adiw { d, k } => {
                let value = self.reg_pair(d);
                let result = value.wrapping_add(k as u16);
                let v = value & 0x8000 == 0 && result & 0x8000 != 0;
                let c = result & 0x8000 == 0 && value & 0x8000 != 0;
                self.set_word_flags(result, v, c);
                self.set_reg_pair(d, result);
                2
            }
            Sbiw { d, k } => {
                let value = self.reg_pair(d);
                let result = value.wrapping_sub(k as u16);
                let v = value & 0x8000 != 0 && result & 0x8000 == 0;
                let c = result & 0x8000 != 0 && value & 0x8000 == 0;
                self.set_word_flags(result, v, c);
                self.set_reg_pair(d, result);
                2
            }

            Mul { d, r } => {
                let product = self.reg(d) as u16 * self.reg(r) as u16;
                self.store_product(product, product & 0x8000 != 0)
            }
            Muls { d, r } => {
                let product = (self.reg(d) as i8 as i16 * self.reg(r) as i8 as i16) as u16;
                self.store_product(product, product & 0x8000 != 0)
            }
            Mulsu { d, r } => {
                let product = (self.reg(d) as i8 as i16 * self.reg(r) as i16) as u16;
                self.store_product(product, product & 0x8000 != 0)
            }
            Fmul { d, r } => {
                let product = self.reg(d) as u16 * self.reg(r) as u16;
                self.store_product(product << 1, product & 0x8000 != 0)
            }
            Fmuls { d, r } => {
                let product = (self.reg(d) as i8 as i16 * self.reg(r) as i8 as i16) as u16;
                self.store_product(product << 1, product & 0x8000 != 0)
            }
            Fmulsu { d, r } => {
                let product = (self.reg(d) as i8 as i16 * self.reg(r) as i16) as u16;
                self.store_product(product << 1, product & 0x8000 != 0)
            }

            Bset { s } => {
                self.set_flag(s, true);
                1
            }
            Bclr { s } => {
                self.set_flag(s, false);
                1
            }
            Bst { d, b } => {
                self.set_flag(SREG_T, self.reg(d) & (1 << b) != 0);
                1
            }
            Bld { d, b } => {
                let value = self.reg(d);
                let bit = 1 << b;
                let value = if self.flag(SREG_T) { value | bit } else { value & !bit };
                self.set_reg(d, value);
                1
            }
            Sbrc { r, b } => {
                if self.reg(r) & (1 << b) == 0 {
                    self.skip_next()
                } else {
                    1
                }
            }
            Sbrs { r, b } => {
                if self.reg(r) & (1 << b) != 0 {
                    self.skip_next()
                } else {
                    1
                }
            }

            In { d, a } => {
                let value = self.read_data(IO_START + a as u16);
                self.set_reg(d, value);
                1
            }
            Out { r, a } => {
                self.write_data(IO_START + a as u16, self.reg(r));
                1
            }
            Cbi { a, b } => {
                self.write_io_bit(IO_START + a as u16, b, false);
                2
            }
            Sbi { a, b } => {
                self.write_io_bit(IO_START + a as u16, b, true);
                2
            }
            Sbic { a, b } => {
                if self.read_data(IO_START + a as u16) & (1 << b) == 0 {
                    self.skip_next()
                } else {
                    1
                }
            }
            Sbis { a, b } => {
                if self.read_data(IO_START + a as u16) & (1 << b) != 0 {
                    self.skip_next()
                } else {
                    1
                }
            }

            Ld { d, ptr, mode } => {
                let addr = self.indirect_address(ptr, mode);
                let value = self.read_data(addr);
                self.set_reg(d, value);
                2
            }
            St { r, ptr, mode } => {
                let value = self.reg(r);
                let addr = self.indirect_address(ptr, mode);
                self.write_data(addr, value);
                2
            }
            Ldd { d, ptr, q } => {
                let addr = self.reg_pair(ptr.low_register()).wrapping_add(q as u16);
                let value = self.read_data(addr);
                self.set_reg(d, value);
                2
            }
            Std { r, ptr, q } => {
                let addr = self.reg_pair(ptr.low_register()).wrapping_add(q as u16);
                self.write_data(addr, self.reg(r));
                2
            }
            Lds { d, k } => {
                let value = self.read_data(k);
                self.set_reg(d, value);
                2
            }
            Sts { r, k } => {
                self.write_data(k, self.reg(r));
                2
            }
            Lpm { d, post_increment } => {
                let z = self.reg_pair(Pointer::Z.low_register());
                self.set_reg(d, self.program_byte(z));
                if post_increment {
                    self.set_reg_pair(Pointer::Z.low_register(), z.wrapping_add(1));
                }
                3
            }
            Push { r } => {
                self.push(self.reg(r));
                2
            }
            Pop { d } => {
                let value = self.pop();
                self.set_reg(d, value);
                2
            }

            Rjmp { k } => {
                self.pc = wrap_pc(self.pc as i32 + k as i32);
                2
            }
            Rcall { k } => {
                self.push_pc(self.pc);
                self.pc = wrap_pc(self.pc as i32 + k as i32);
                3
            }
            Jmp { k } => {
                self.pc = wrap_pc(k as i32);
                3
            }
            Call { k } => {
                self.push_pc(self.pc);
                self.pc = wrap_pc(k as i32);
                4
            }
            Ijmp => {
                self.pc = wrap_pc(self.reg_pair(Pointer::Z.low_register()) as i32);
                2
            }
            Icall => {
                self.push_pc(self.pc);
                self.pc = wrap_pc(self.reg_pair(Pointer::Z.low_register()) as i32);
                3
            }
            Ret => {
                self.pc = wrap_pc(self.pop_pc() as i32);
                4
            }
            Reti => {
                self.pc = wrap_pc(self.pop_pc() as i32);
                self.set_flag(SREG_I, true);
                4
            }
            Brbs { s, k } => self.branch(self.flag(s), k),
            Brbc { s, k } => self.branch(!self.flag(s), k),
        }
    }

    fn branch(&mut self, taken: bool, k: i8) -> u8 {
        if taken {
            self.pc = wrap_pc(self.pc as i32 + k as i32);
            2
        } else {
            1
        }
    }

    /// Skips the instruction at `pc`; returns the cycles of the skipping
    /// instruction.
    fn skip_next(&mut self) -> u8 {
        let words = if is_two_word(self.fetch(self.pc)) { 2 } else { 1 };
        self.pc = wrap_pc(self.pc as i32 + words);
        1 + words as u8
    }

    fn indirect_address(&mut self, ptr: Pointer, mode: AddressMode) -> u16 {
        let base = ptr.low_register();
        let value = self.reg_pair(base);
        match mode {
            AddressMode::Plain => value,
            AddressMode::PostIncrement => {
                self.set_reg_pair(base, value.wrapping_add(1));
                value
            }
            AddressMode::PreDecrement => {
                let value = value.wrapping_sub(1);
                self.set_reg_pair(base, value);
                value
            }
        }
    }

    fn add8(&mut self, a: u8, b: u8, carry: bool) -> u8 {
        let c = carry as u16;
        let sum = a as u16 + b as u16 + c;
        let result = sum as u8;
        self.set_flag(SREG_H, (a & 0x0F) as u16 + (b & 0x0F) as u16 + c > 0x0F);
        self.set_flag(SREG_C, sum > 0xFF);
        self.set_nvsz(result, !(a ^ b) & (a ^ result) & 0x80 != 0);
        result
    }

    /// Subtraction flags. With `chain`, Z is only kept set, never set, so
    /// multi-byte compares see zero across all bytes.
    fn sub8(&mut self, a: u8, b: u8, carry: bool, chain: bool) -> u8 {
        let c = carry as u16;
        let result = (a as u16).wrapping_sub(b as u16).wrapping_sub(c) as u8;
        let zero = if chain { result == 0 && self.flag(SREG_Z) } else { result == 0 };
        self.set_flag(SREG_H, (b & 0x0F) as u16 + c > (a & 0x0F) as u16);
        self.set_flag(SREG_C, b as u16 + c > a as u16);
        self.set_nvsz(result, (a ^ b) & (a ^ result) & 0x80 != 0);
        self.set_flag(SREG_Z, zero);
        result
    }

    fn logic(&mut self, d: u8, result: u8) -> u8 {
        self.set_nvsz(result, false);
        self.set_reg(d, result);
        1
    }

    fn shift(&mut self, d: u8, result: u8, carry: bool) -> u8 {
        let n = result & 0x80 != 0;
        self.set_flag(SREG_C, carry);
        self.set_nvsz(result, n ^ carry);
        self.set_reg(d, result);
        1
    }

    fn set_nvsz(&mut self, result: u8, overflow: bool) {
        let negative = result & 0x80 != 0;
        self.set_flag(SREG_N, negative);
        self.set_flag(SREG_V, overflow);
        self.set_flag(SREG_S, negative ^ overflow);
        self.set_flag(SREG_Z, result == 0);
    }

    fn set_word_flags(&mut self, result: u16, overflow: bool, carry: bool) {
        let negative = result & 0x8000 != 0;
        self.set_flag(SREG_N, negative);
        self.set_flag(SREG_V, overflow);
        self.set_flag(SREG_S, negative ^ overflow);
        self.set_flag(SREG_Z, result == 0);
        self.set_flag(SREG_C, carry);
    }

    fn store_product(&mut self, product: u16, carry: bool) -> u8 {
        self.set_reg_pair(0, product);
        self.set_flag(SREG_C, carry);
        self.set_flag(SREG_Z, product == 0);
        2
    }
}
