//! Instruction execution, decoded by the x/y/z/p/q fields of the opcode.

use emu_core::{CpuEvents, IoBus};

use super::{Index, Instruction, Outcome, Table, Z80};
use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};

impl Z80 {
    pub(super) fn execute<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &Instruction,
    ) -> Result<Outcome, E::Error> {
        match ins.table {
            Table::Main => self.execute_main(bus, events, ins),
            Table::Cb => self.execute_cb(bus, events, ins).map(|()| Outcome::Normal),
            Table::Ed => self.execute_ed(bus, events, ins),
        }
    }

    fn read_operand<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &Instruction,
        r: u8,
    ) -> Result<u8, E::Error> {
        if r == 6 {
            let address = self.operand_address(ins);
            self.read(bus, events, address)
        } else {
            Ok(self.reg8(r, ins.index))
        }
    }

    fn write_operand<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &Instruction,
        r: u8,
        value: u8,
    ) -> Result<(), E::Error> {
        if r == 6 {
            let address = self.operand_address(ins);
            self.write(bus, events, address, value)
        } else {
            self.set_reg8(r, ins.index, value);
            Ok(())
        }
    }

    fn jump_relative(&mut self, ins: &Instruction) {
        let offset = ins.n() as i8;
        self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(offset));
    }

    fn alu_op(&mut self, op: u8, value: u8) {
        let a = self.regs.a;
        let carry = self.regs.f & CF != 0;
        let result = match op {
            0 => alu::add8(a, value, false),
            1 => alu::add8(a, value, carry),
            2 => alu::sub8(a, value, false),
            3 => alu::sub8(a, value, carry),
            4 => alu::and8(a, value),
            5 => alu::xor8(a, value),
            6 => alu::or8(a, value),
            _ => alu::cp8(a, value),
        };
        self.regs.a = result.value;
        self.regs.f = result.flags;
    }

    fn execute_main<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &Instruction,
    ) -> Result<Outcome, E::Error> {
        let op = ins.opcode;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;
        let index = ins.index;

        match x {
            0 => match z {
                0 => match y {
                    // NOP
                    0 => {}
                    // EX AF,AF'
                    1 => self.regs.swap_af(),
                    // DJNZ e
                    2 => {
                        self.regs.b = self.regs.b.wrapping_sub(1);
                        if self.regs.b != 0 {
                            self.jump_relative(ins);
                        }
                    }
                    // JR e
                    3 => self.jump_relative(ins),
                    // JR cc,e
                    _ => {
                        if self.condition(y - 4) {
                            self.jump_relative(ins);
                        }
                    }
                },
                1 => {
                    if q == 0 {
                        // LD rr,nn
                        self.set_rp(p, index, ins.immediate);
                    } else {
                        // ADD HL,rr
                        let (value, f) =
                            alu::add16(self.hl_or_index(index), self.rp(p, index), self.regs.f);
                        self.set_hl_or_index(index, value);
                        self.regs.f = f;
                    }
                }
                2 => match (q, p) {
                    // LD (BC),A / LD (DE),A
                    (0, 0) => self.write(bus, events, self.regs.bc(), self.regs.a)?,
                    (0, 1) => self.write(bus, events, self.regs.de(), self.regs.a)?,
                    // LD (nn),HL
                    (0, 2) => {
                        let value = self.hl_or_index(index);
                        self.write16(bus, events, ins.immediate, value)?;
                    }
                    // LD (nn),A
                    (0, _) => self.write(bus, events, ins.immediate, self.regs.a)?,
                    // LD A,(BC) / LD A,(DE)
                    (_, 0) => self.regs.a = self.read(bus, events, self.regs.bc())?,
                    (_, 1) => self.regs.a = self.read(bus, events, self.regs.de())?,
                    // LD HL,(nn)
                    (_, 2) => {
                        let value = self.read16(bus, events, ins.immediate)?;
                        self.set_hl_or_index(index, value);
                    }
                    // LD A,(nn)
                    _ => self.regs.a = self.read(bus, events, ins.immediate)?,
                },
                // INC rr / DEC rr
                3 => {
                    let value = self.rp(p, index);
                    let value = if q == 0 {
                        value.wrapping_add(1)
                    } else {
                        value.wrapping_sub(1)
                    };
                    self.set_rp(p, index, value);
                }
                // INC r / DEC r
                4 | 5 => {
                    let value = self.read_operand(bus, events, ins, y)?;
                    let result = if z == 4 {
                        alu::inc8(value)
                    } else {
                        alu::dec8(value)
                    };
                    self.regs.f = result.flags | (self.regs.f & CF);
                    self.write_operand(bus, events, ins, y, result.value)?;
                }
                // LD r,n
                6 => self.write_operand(bus, events, ins, y, ins.n())?,
                _ => self.accumulator_op(y),
            },
            1 => {
                // HALT
                if op == 0x76 {
                    self.regs.halted = true;
                    return Ok(Outcome::Halted);
                }
                // LD r,r'. With (IX+d) on one side, the other side is plain H/L.
                let value = if z == 6 {
                    self.read_operand(bus, events, ins, 6)?
                } else if y == 6 {
                    self.reg8(z, Index::Hl)
                } else {
                    self.reg8(z, index)
                };
                if y == 6 {
                    self.write_operand(bus, events, ins, 6, value)?;
                } else if z == 6 {
                    self.set_reg8(y, Index::Hl, value);
                } else {
                    self.set_reg8(y, index, value);
                }
            }
            // ALU A,r
            2 => {
                let value = self.read_operand(bus, events, ins, z)?;
                self.alu_op(y, value);
            }
            _ => match z {
                // RET cc
                0 => {
                    if self.condition(y) {
                        self.regs.pc = self.pop16(bus, events)?;
                        return Ok(Outcome::Returned);
                    }
                }
                1 => {
                    if q == 0 {
                        // POP rr
                        let value = self.pop16(bus, events)?;
                        self.set_rp2(p, index, value);
                    } else {
                        match p {
                            // RET
                            0 => {
                                self.regs.pc = self.pop16(bus, events)?;
                                return Ok(Outcome::Returned);
                            }
                            // EXX
                            1 => self.regs.swap_main(),
                            // JP (HL)
                            2 => self.regs.pc = self.hl_or_index(index),
                            // LD SP,HL
                            _ => self.regs.sp = self.hl_or_index(index),
                        }
                    }
                }
                // JP cc,nn
                2 => {
                    if self.condition(y) {
                        self.regs.pc = ins.immediate;
                    }
                }
                3 => match y {
                    // JP nn
                    0 => self.regs.pc = ins.immediate,
                    // OUT (n),A
                    2 => self.port_out(bus, events, u16::from(ins.n()), self.regs.a)?,
                    // IN A,(n)
                    3 => self.regs.a = self.port_in(bus, events, u16::from(ins.n()))?,
                    // EX (SP),HL
                    4 => {
                        let sp = self.regs.sp;
                        let value = self.read16(bus, events, sp)?;
                        let pair = self.hl_or_index(index);
                        self.write16(bus, events, sp, pair)?;
                        self.set_hl_or_index(index, value);
                    }
                    // EX DE,HL
                    5 => {
                        let de = self.regs.de();
                        self.regs.set_de(self.regs.hl());
                        self.regs.set_hl(de);
                    }
                    // DI
                    6 => {
                        self.regs.iff1 = false;
                        self.regs.iff2 = false;
                    }
                    // EI
                    7 => {
                        self.regs.iff1 = true;
                        self.regs.iff2 = true;
                    }
                    // CB prefix, decoded at fetch
                    _ => {}
                },
                // CALL cc,nn
                4 => {
                    if self.condition(y) {
                        self.push16(bus, events, self.regs.pc)?;
                        self.regs.pc = ins.immediate;
                    }
                }
                5 => {
                    if q == 0 {
                        // PUSH rr
                        let value = self.rp2(p, index);
                        self.push16(bus, events, value)?;
                    } else if p == 0 {
                        // CALL nn
                        self.push16(bus, events, self.regs.pc)?;
                        self.regs.pc = ins.immediate;
                    }
                }
                // ALU A,n
                6 => self.alu_op(y, ins.n()),
                // RST p
                _ => {
                    self.push16(bus, events, self.regs.pc)?;
                    self.regs.pc = u16::from(y) * 8;
                }
            },
        }
        Ok(Outcome::Normal)
    }

    /// RLCA, RRCA, RLA, RRA, DAA, CPL, SCF, CCF.
    fn accumulator_op(&mut self, y: u8) {
        let a = self.regs.a;
        let f = self.regs.f;
        let keep = f & (SF | ZF | PF);
        match y {
            0..=3 => {
                let (value, carry) = match y {
                    0 => (a.rotate_left(1), a >> 7),
                    1 => (a.rotate_right(1), a & 1),
                    2 => ((a << 1) | (f & CF), a >> 7),
                    _ => ((a >> 1) | ((f & CF) << 7), a & 1),
                };
                self.regs.a = value;
                self.regs.f = keep | (value & (YF | XF)) | carry;
            }
            4 => {
                let result = alu::daa(a, f);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            5 => {
                let value = !a;
                self.regs.a = value;
                self.regs.f = (f & (SF | ZF | PF | CF)) | HF | NF | (value & (YF | XF));
            }
            6 => self.regs.f = keep | CF | (a & (YF | XF)),
            _ => {
                let carry = f & CF;
                let half = if carry != 0 { HF } else { 0 };
                self.regs.f = keep | half | (carry ^ CF) | (a & (YF | XF));
            }
        }
    }

    fn execute_cb<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &Instruction,
    ) -> Result<(), E::Error> {
        let op = ins.opcode;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let in_memory = z == 6 || ins.index != Index::Hl;
        let address = self.operand_address(ins);

        let value = if in_memory {
            self.read(bus, events, address)?
        } else {
            self.reg8(z, Index::Hl)
        };

        let result = match x {
            0 => {
                let r = alu::shift(y, value, self.regs.f & CF != 0);
                self.regs.f = r.flags;
                r.value
            }
            // BIT y,r
            1 => {
                let bit = value & (1 << y);
                let mut f = (self.regs.f & CF) | HF | (value & (YF | XF));
                if bit == 0 {
                    f |= ZF | PF;
                }
                if y == 7 && bit != 0 {
                    f |= SF;
                }
                self.regs.f = f;
                return Ok(());
            }
            2 => value & !(1 << y),
            _ => value | (1 << y),
        };

        if in_memory {
            self.write(bus, events, address, result)?;
            // DDCB/FDCB forms also copy the result into a register.
            if z != 6 {
                self.set_reg8(z, Index::Hl, result);
            }
        } else {
            self.set_reg8(z, Index::Hl, result);
        }
        Ok(())
    }

    fn execute_ed<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &Instruction,
    ) -> Result<Outcome, E::Error> {
        let op = ins.opcode;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match (x, z) {
            // IN r,(C)
            (1, 0) => {
                let value = self.port_in(bus, events, u16::from(self.regs.c))?;
                if y != 6 {
                    self.set_reg8(y, Index::Hl, value);
                }
                self.regs.f = (self.regs.f & CF) | sz53p(value);
            }
            // OUT (C),r
            (1, 1) => {
                let value = if y == 6 { 0 } else { self.reg8(y, Index::Hl) };
                self.port_out(bus, events, u16::from(self.regs.c), value)?;
            }
            // SBC HL,rr / ADC HL,rr
            (1, 2) => {
                let carry = self.regs.f & CF != 0;
                let hl = self.regs.hl();
                let rr = self.rp(p, Index::Hl);
                let (value, f) = if q == 0 {
                    alu::sbc16(hl, rr, carry)
                } else {
                    alu::adc16(hl, rr, carry)
                };
                self.regs.set_hl(value);
                self.regs.f = f;
            }
            // LD (nn),rr / LD rr,(nn)
            (1, 3) => {
                if q == 0 {
                    let value = self.rp(p, Index::Hl);
                    self.write16(bus, events, ins.immediate, value)?;
                } else {
                    let value = self.read16(bus, events, ins.immediate)?;
                    self.set_rp(p, Index::Hl, value);
                }
            }
            // NEG
            (1, 4) => {
                let result = alu::sub8(0, self.regs.a, false);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            // RETN / RETI
            (1, 5) => {
                self.regs.pc = self.pop16(bus, events)?;
                self.regs.iff1 = self.regs.iff2;
                return Ok(Outcome::Returned);
            }
            // IM 0/1/2
            (1, 6) => self.regs.im = [0, 0, 1, 2][usize::from(y & 3)],
            (1, 7) => self.execute_ed_misc(bus, events, y)?,
            // Block transfer and compare
            (2, 0 | 1) if y >= 4 => self.execute_block(bus, events, y, z)?,
            // Everything else behaves as a NOP.
            _ => {}
        }
        Ok(Outcome::Normal)
    }

    /// LD I,A / LD R,A / LD A,I / LD A,R / RRD / RLD.
    fn execute_ed_misc<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        y: u8,
    ) -> Result<(), E::Error> {
        match y {
            0 => self.regs.i = self.regs.a,
            1 => self.regs.r = self.regs.a,
            2 | 3 => {
                let value = if y == 2 { self.regs.i } else { self.regs.r };
                self.regs.a = value;
                let iff = if self.regs.iff2 { PF } else { 0 };
                self.regs.f = (self.regs.f & CF) | sz53(value) | iff;
            }
            4 | 5 => {
                let hl = self.regs.hl();
                let memory = self.read(bus, events, hl)?;
                let a = self.regs.a;
                let (memory, a) = if y == 4 {
                    ((a << 4) | (memory >> 4), (a & 0xF0) | (memory & 0x0F))
                } else {
                    ((memory << 4) | (a & 0x0F), (a & 0xF0) | (memory >> 4))
                };
                self.write(bus, events, hl, memory)?;
                self.regs.a = a;
                self.regs.f = (self.regs.f & CF) | sz53p(a);
            }
            _ => {}
        }
        Ok(())
    }

    /// LDI/LDD/LDIR/LDDR (z = 0) and CPI/CPD/CPIR/CPDR (z = 1).
    fn execute_block<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        y: u8,
        z: u8,
    ) -> Result<(), E::Error> {
        let decrement = y & 1 != 0;
        let repeat = y >= 6;
        let step = |value: u16| {
            if decrement {
                value.wrapping_sub(1)
            } else {
                value.wrapping_add(1)
            }
        };

        let hl = self.regs.hl();
        let value = self.read(bus, events, hl)?;
        self.regs.set_hl(step(hl));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);
        let counting = if bc != 0 { PF } else { 0 };

        let again = if z == 0 {
            let de = self.regs.de();
            self.write(bus, events, de, value)?;
            self.regs.set_de(step(de));
            let n = value.wrapping_add(self.regs.a);
            self.regs.f =
                (self.regs.f & (SF | ZF | CF)) | counting | (n & XF) | ((n << 4) & YF);
            bc != 0
        } else {
            let result = alu::sub8(self.regs.a, value, false);
            let half = result.flags & HF;
            let n = result.value.wrapping_sub(u8::from(half != 0));
            self.regs.f = (self.regs.f & CF)
                | NF
                | (result.flags & (SF | ZF | HF))
                | counting
                | (n & XF)
                | ((n << 4) & YF);
            bc != 0 && result.value != 0
        };

        if repeat && again {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
        }
        Ok(())
    }
}
