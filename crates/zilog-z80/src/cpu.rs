//! Z80 CPU core, one whole instruction per step.
//!
//! Every memory and port access goes through [`CpuEvents::memory_access`]
//! when the observer is attached to [`EventFeed::MemoryAccess`], so an
//! observer can satisfy reads and suppress or rewrite writes.

mod execute;

use emu_core::{
    AccessKind, AddressSpace, Cpu, CpuEvents, Directive, EventFeed, IoBus, MemoryAccess,
    Observable, StopReason, Value,
};

use crate::flags::{CF, HF, NF, PF, SF, ZF};
use crate::registers::Registers;

/// Register pair a DD/FD prefix substitutes for HL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Index {
    #[default]
    Hl,
    Ix,
    Iy,
}

/// Opcode table an instruction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Table {
    #[default]
    Main,
    Cb,
    Ed,
}

/// A fully fetched instruction.
#[derive(Debug, Clone, Copy, Default)]
struct Instruction {
    bytes: [u8; 4],
    len: usize,
    table: Table,
    index: Index,
    opcode: u8,
    displacement: i8,
    immediate: u16,
}

impl Instruction {
    fn push(&mut self, byte: u8) {
        self.bytes[self.len] = byte;
        self.len += 1;
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The 8-bit immediate operand.
    const fn n(&self) -> u8 {
        self.immediate as u8
    }
}

/// How an executed instruction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Normal,
    Returned,
    Halted,
}

/// The Z80 CPU.
#[derive(Debug, Clone)]
pub struct Z80 {
    regs: Registers,
    /// SP as set by reset or `set_sp`; a return that leaves SP two above it
    /// has emptied the stack.
    stack_base: u16,
    stop_on_ret_with_empty_stack: bool,
    /// Opcode byte already read from the given address by the previous
    /// step, which ended on a lone prefix.
    prefetched: Option<(u16, u8)>,
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        let regs = Registers::after_reset();
        Self {
            stack_base: regs.sp,
            regs,
            stop_on_ret_with_empty_stack: true,
            prefetched: None,
        }
    }

    #[must_use]
    pub const fn regs(&self) -> &Registers {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    #[must_use]
    pub const fn sp(&self) -> u16 {
        self.regs.sp
    }

    /// Set SP and make it the new stack base.
    pub fn set_sp(&mut self, sp: u16) {
        self.regs.sp = sp;
        self.stack_base = sp;
    }

    /// Whether `run` ends when a return empties the stack. On by default.
    pub fn set_stop_on_ret_with_empty_stack(&mut self, enabled: bool) {
        self.stop_on_ret_with_empty_stack = enabled;
    }

    fn stack_is_empty(&self) -> bool {
        self.regs.sp == self.stack_base.wrapping_add(2)
    }

    // === Evented bus access ===

    fn read<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        address: u16,
    ) -> Result<u8, E::Error> {
        self.transfer_in(bus, events, AddressSpace::Memory, address)
    }

    fn write<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        address: u16,
        value: u8,
    ) -> Result<(), E::Error> {
        self.transfer_out(bus, events, AddressSpace::Memory, address, value)
    }

    fn port_in<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        port: u16,
    ) -> Result<u8, E::Error> {
        self.transfer_in(bus, events, AddressSpace::Port, port)
    }

    fn port_out<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        port: u16,
        value: u8,
    ) -> Result<(), E::Error> {
        self.transfer_out(bus, events, AddressSpace::Port, port, value)
    }

    fn transfer_in<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        space: AddressSpace,
        address: u16,
    ) -> Result<u8, E::Error> {
        let bus_read = |bus: &mut B| match space {
            AddressSpace::Memory => bus.read(address),
            AddressSpace::Port => bus.read_io(address),
        };
        if !events.is_attached(EventFeed::MemoryAccess) {
            return Ok(bus_read(bus));
        }

        let mut before = MemoryAccess::new(space, AccessKind::BeforeRead, address, 0);
        events.memory_access(self, &mut before)?;
        let value = if before.cancelled {
            before.value
        } else {
            bus_read(bus)
        };

        let mut after = MemoryAccess::new(space, AccessKind::AfterRead, address, value);
        after.cancelled = before.cancelled;
        events.memory_access(self, &mut after)?;
        Ok(after.value)
    }

    fn transfer_out<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        space: AddressSpace,
        address: u16,
        value: u8,
    ) -> Result<(), E::Error> {
        let bus_write = |bus: &mut B, value: u8| match space {
            AddressSpace::Memory => bus.write(address, value),
            AddressSpace::Port => bus.write_io(address, value),
        };
        if !events.is_attached(EventFeed::MemoryAccess) {
            bus_write(bus, value);
            return Ok(());
        }

        let mut before = MemoryAccess::new(space, AccessKind::BeforeWrite, address, value);
        events.memory_access(self, &mut before)?;
        if !before.cancelled {
            bus_write(bus, before.value);
        }

        let mut after = MemoryAccess::new(space, AccessKind::AfterWrite, address, before.value);
        after.cancelled = before.cancelled;
        events.memory_access(self, &mut after)
    }

    fn read16<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        address: u16,
    ) -> Result<u16, E::Error> {
        let lo = self.read(bus, events, address)?;
        let hi = self.read(bus, events, address.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn write16<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        address: u16,
        value: u16,
    ) -> Result<(), E::Error> {
        let [lo, hi] = value.to_le_bytes();
        self.write(bus, events, address, lo)?;
        self.write(bus, events, address.wrapping_add(1), hi)
    }

    fn push16<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        value: u16,
    ) -> Result<(), E::Error> {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write(bus, events, self.regs.sp, hi)?;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write(bus, events, self.regs.sp, lo)
    }

    fn pop16<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
    ) -> Result<u16, E::Error> {
        let value = self.read16(bus, events, self.regs.sp)?;
        self.regs.sp = self.regs.sp.wrapping_add(2);
        Ok(value)
    }

    /// RET, as forced by an observer.
    fn force_ret<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
    ) -> Result<Outcome, E::Error> {
        self.regs.pc = self.pop16(bus, events)?;
        Ok(Outcome::Returned)
    }

    // === Fetch ===

    fn fetch_byte<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &mut Instruction,
    ) -> Result<u8, E::Error> {
        let byte = self.read(bus, events, self.regs.pc)?;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        ins.push(byte);
        Ok(byte)
    }

    /// M1 fetch: also bumps the refresh register.
    fn fetch_opcode<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &mut Instruction,
    ) -> Result<u8, E::Error> {
        self.regs.r = (self.regs.r & 0x80) | (self.regs.r.wrapping_add(1) & 0x7F);
        self.fetch_byte(bus, events, ins)
    }

    fn fetch_immediate<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
        ins: &mut Instruction,
        len: usize,
    ) -> Result<(), E::Error> {
        match len {
            1 => ins.immediate = u16::from(self.fetch_byte(bus, events, ins)?),
            2 => {
                let lo = self.fetch_byte(bus, events, ins)?;
                let hi = self.fetch_byte(bus, events, ins)?;
                ins.immediate = u16::from_le_bytes([lo, hi]);
            }
            _ => {}
        }
        Ok(())
    }

    fn fetch_instruction<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
    ) -> Result<Instruction, E::Error> {
        let mut ins = Instruction::default();
        let first = match self.prefetched.take() {
            Some((address, byte)) if address == self.regs.pc => {
                self.regs.pc = address.wrapping_add(1);
                ins.push(byte);
                byte
            }
            _ => self.fetch_opcode(bus, events, &mut ins)?,
        };
        match first {
            0xCB => {
                ins.table = Table::Cb;
                ins.opcode = self.fetch_opcode(bus, events, &mut ins)?;
            }
            0xED => {
                ins.table = Table::Ed;
                ins.opcode = self.fetch_opcode(bus, events, &mut ins)?;
                if ins.opcode & 0xC7 == 0x43 {
                    self.fetch_immediate(bus, events, &mut ins, 2)?;
                }
            }
            0xDD | 0xFD => {
                ins.index = if first == 0xDD { Index::Ix } else { Index::Iy };
                let op = self.fetch_opcode(bus, events, &mut ins)?;
                match op {
                    0xDD | 0xED | 0xFD => {
                        // A prefix followed by another prefix acts alone as a NOP.
                        // The second one starts the next instruction.
                        self.regs.pc = self.regs.pc.wrapping_sub(1);
                        self.prefetched = Some((self.regs.pc, op));
                        ins.len -= 1;
                        ins.index = Index::Hl;
                        ins.opcode = 0x00;
                    }
                    0xCB => {
                        ins.table = Table::Cb;
                        ins.displacement = self.fetch_byte(bus, events, &mut ins)? as i8;
                        ins.opcode = self.fetch_byte(bus, events, &mut ins)?;
                    }
                    _ => {
                        ins.opcode = op;
                        if uses_indexed_memory(op) {
                            ins.displacement = self.fetch_byte(bus, events, &mut ins)? as i8;
                        }
                        self.fetch_immediate(bus, events, &mut ins, immediate_len(op))?;
                    }
                }
            }
            _ => {
                ins.opcode = first;
                self.fetch_immediate(bus, events, &mut ins, immediate_len(first))?;
            }
        }
        Ok(ins)
    }

    // === Register helpers ===

    /// 8-bit register by its 3-bit encoding, with H/L replaced by the
    /// halves of IX/IY when `index` selects them.
    fn reg8(&self, r: u8, index: Index) -> u8 {
        match r {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => (self.hl_or_index(index) >> 8) as u8,
            5 => self.hl_or_index(index) as u8,
            7 => self.regs.a,
            _ => unreachable!("(HL) is not a register"),
        }
    }

    fn set_reg8(&mut self, r: u8, index: Index, value: u8) {
        match r {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => {
                let pair = self.hl_or_index(index);
                self.set_hl_or_index(index, (pair & 0x00FF) | (u16::from(value) << 8));
            }
            5 => {
                let pair = self.hl_or_index(index);
                self.set_hl_or_index(index, (pair & 0xFF00) | u16::from(value));
            }
            7 => self.regs.a = value,
            _ => unreachable!("(HL) is not a register"),
        }
    }

    const fn hl_or_index(&self, index: Index) -> u16 {
        match index {
            Index::Hl => self.regs.hl(),
            Index::Ix => self.regs.ix,
            Index::Iy => self.regs.iy,
        }
    }

    fn set_hl_or_index(&mut self, index: Index, value: u16) {
        match index {
            Index::Hl => self.regs.set_hl(value),
            Index::Ix => self.regs.ix = value,
            Index::Iy => self.regs.iy = value,
        }
    }

    /// BC, DE, HL (or IX/IY), SP.
    const fn rp(&self, p: u8, index: Index) -> u16 {
        match p {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.hl_or_index(index),
            _ => self.regs.sp,
        }
    }

    fn set_rp(&mut self, p: u8, index: Index, value: u16) {
        match p {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_hl_or_index(index, value),
            _ => self.regs.sp = value,
        }
    }

    /// Like [`Self::rp`] with AF in place of SP, for PUSH and POP.
    const fn rp2(&self, p: u8, index: Index) -> u16 {
        if p == 3 { self.regs.af() } else { self.rp(p, index) }
    }

    fn set_rp2(&mut self, p: u8, index: Index, value: u16) {
        if p == 3 {
            self.regs.set_af(value);
        } else {
            self.set_rp(p, index, value);
        }
    }

    /// Address of the `(HL)` / `(IX+d)` / `(IY+d)` operand.
    fn operand_address(&self, ins: &Instruction) -> u16 {
        match ins.index {
            Index::Hl => self.regs.hl(),
            Index::Ix => self.regs.ix.wrapping_add_signed(i16::from(ins.displacement)),
            Index::Iy => self.regs.iy.wrapping_add_signed(i16::from(ins.displacement)),
        }
    }

    /// NZ, Z, NC, C, PO, PE, P, M.
    const fn condition(&self, cc: u8) -> bool {
        let f = self.regs.f;
        match cc {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }
}

/// Bytes of immediate data following an unprefixed (or DD/FD) opcode.
const fn immediate_len(op: u8) -> usize {
    match op {
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E | 0x10 | 0x18 | 0x20 | 0x28
        | 0x30 | 0x38 | 0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE | 0xD3 | 0xDB => 1,
        0x01 | 0x11 | 0x21 | 0x31 | 0x22 | 0x2A | 0x32 | 0x3A | 0xC3 | 0xCD => 2,
        _ if op & 0xC7 == 0xC2 || op & 0xC7 == 0xC4 => 2,
        _ => 0,
    }
}

/// DD/FD opcodes that take a displacement byte for `(IX+d)`.
const fn uses_indexed_memory(op: u8) -> bool {
    match op {
        0x34..=0x36 => true,
        0x40..=0x7F => op != 0x76 && (op & 0x07 == 0x06 || op & 0x38 == 0x30),
        0x80..=0xBF => op & 0x07 == 0x06,
        _ => false,
    }
}

impl Cpu for Z80 {
    type Registers = Registers;

    fn step<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
    ) -> Result<Option<StopReason>, E::Error> {
        if self.regs.halted {
            return Ok(Some(StopReason::Halted));
        }

        if events.is_attached(EventFeed::BeforeFetch)
            && events.before_fetch(self, self.regs.pc)? == Directive::Return
        {
            let outcome = self.force_ret(bus, events)?;
            return Ok(self.stop_reason(outcome));
        }

        // The observer may have moved PC.
        let address = self.regs.pc;

        let ins = self.fetch_instruction(bus, events)?;

        let outcome = if events.is_attached(EventFeed::BeforeExecution)
            && events.before_execution(self, address, ins.bytes())? == Directive::Return
        {
            self.force_ret(bus, events)?
        } else {
            self.execute(bus, events, &ins)?
        };

        if events.is_attached(EventFeed::AfterExecution)
            && events.after_execution(self, address, ins.bytes())? == Directive::Stop
        {
            return Ok(Some(StopReason::Requested));
        }

        Ok(self.stop_reason(outcome))
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }

    fn reset(&mut self) {
        self.regs = Registers::after_reset();
        self.stack_base = self.regs.sp;
        self.prefetched = None;
    }
}

impl Z80 {
    fn stop_reason(&self, outcome: Outcome) -> Option<StopReason> {
        match outcome {
            Outcome::Halted => Some(StopReason::Halted),
            Outcome::Returned if self.stop_on_ret_with_empty_stack && self.stack_is_empty() => {
                Some(StopReason::ReturnWithEmptyStack)
            }
            _ => None,
        }
    }
}

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        let r = &self.regs;
        let flag = |mask: u8| Value::Bool(r.f & mask != 0);
        Some(match path {
            "a" => r.a.into(),
            "f" => r.f.into(),
            "b" => r.b.into(),
            "c" => r.c.into(),
            "d" => r.d.into(),
            "e" => r.e.into(),
            "h" => r.h.into(),
            "l" => r.l.into(),
            "bc" => r.bc().into(),
            "de" => r.de().into(),
            "hl" => r.hl().into(),
            "ix" => r.ix.into(),
            "iy" => r.iy.into(),
            "sp" => r.sp.into(),
            "pc" => r.pc.into(),
            "i" => r.i.into(),
            "r" => r.r.into(),
            "flags.s" => flag(SF),
            "flags.z" => flag(ZF),
            "flags.h" => flag(HF),
            "flags.pv" => flag(PF),
            "flags.n" => flag(NF),
            "flags.c" => flag(CF),
            "halted" => r.halted.into(),
            _ => return None,
        })
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "a", "f", "b", "c", "d", "e", "h", "l", "bc", "de", "hl", "ix", "iy", "sp", "pc", "i",
            "r", "flags.s", "flags.z", "flags.h", "flags.pv", "flags.n", "flags.c", "halted",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::{NoEvents, SimpleBus};

    fn fetch(program: &[u8]) -> Instruction {
        let mut bus = SimpleBus::new();
        bus.load(0, program);
        let mut cpu = Z80::new();
        cpu.set_pc(0);
        let Ok(ins) = cpu.fetch_instruction(&mut bus, &mut NoEvents);
        ins
    }

    #[test]
    fn fetch_collects_prefix_displacement_and_immediate() {
        // LD (IX+5),0x2A
        let ins = fetch(&[0xDD, 0x36, 0x05, 0x2A]);
        assert_eq!(ins.bytes(), &[0xDD, 0x36, 0x05, 0x2A]);
        assert_eq!(ins.index, Index::Ix);
        assert_eq!(ins.displacement, 5);
        assert_eq!(ins.n(), 0x2A);
    }

    #[test]
    fn fetch_indexed_bit_instruction() {
        // SET 1,(IY-1)
        let ins = fetch(&[0xFD, 0xCB, 0xFF, 0xCE]);
        assert_eq!(ins.table, Table::Cb);
        assert_eq!(ins.displacement, -1);
        assert_eq!(ins.opcode, 0xCE);
    }

    #[test]
    fn fetch_ed_with_address() {
        // LD (0x1234),BC
        let ins = fetch(&[0xED, 0x43, 0x34, 0x12]);
        assert_eq!(ins.len, 4);
        assert_eq!(ins.immediate, 0x1234);
    }

    #[test]
    fn doubled_prefix_is_fetched_alone() {
        let ins = fetch(&[0xDD, 0xFD, 0x21, 0x00, 0x00]);
        assert_eq!(ins.bytes(), &[0xDD]);
        assert_eq!(ins.opcode, 0x00);
    }

    #[test]
    fn second_prefix_is_not_fetched_twice() {
        let mut bus = SimpleBus::new();
        // DD (ignored), LD IY,0x1234
        bus.load(0, &[0xDD, 0xFD, 0x21, 0x34, 0x12]);
        let mut cpu = Z80::new();
        cpu.set_pc(0);
        cpu.regs_mut().r = 0;

        let Ok(lone) = cpu.fetch_instruction(&mut bus, &mut NoEvents);
        assert_eq!(lone.bytes(), &[0xDD]);
        assert_eq!(cpu.regs().pc, 1);

        let Ok(ins) = cpu.fetch_instruction(&mut bus, &mut NoEvents);
        assert_eq!(ins.bytes(), &[0xFD, 0x21, 0x34, 0x12]);
        assert_eq!(ins.index, Index::Iy);
        assert_eq!(ins.immediate, 0x1234);
        // One M1 cycle per opcode byte: DD, FD, 21.
        assert_eq!(cpu.regs().r, 3);
    }

    #[test]
    fn prefetched_byte_is_dropped_when_pc_moves() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0xDD, 0xFD]);
        // LD A,0x42
        bus.load(0x0200, &[0x3E, 0x42]);
        let mut cpu = Z80::new();
        cpu.set_pc(0);

        let Ok(_) = cpu.fetch_instruction(&mut bus, &mut NoEvents);
        cpu.set_pc(0x0200);
        let Ok(ins) = cpu.fetch_instruction(&mut bus, &mut NoEvents);
        assert_eq!(ins.bytes(), &[0x3E, 0x42]);
    }

    #[test]
    fn call_and_jump_immediates() {
        assert_eq!(immediate_len(0xCD), 2);
        assert_eq!(immediate_len(0xC4), 2);
        assert_eq!(immediate_len(0xFA), 2);
        assert_eq!(immediate_len(0xC9), 0);
        assert_eq!(immediate_len(0xDB), 1);
    }

    #[test]
    fn observable_paths_all_resolve() {
        let cpu = Z80::new();
        for path in cpu.query_paths() {
            assert!(cpu.query(path).is_some(), "{path}");
        }
        assert_eq!(cpu.query("sp"), Some(Value::U16(0xFFFF)));
        assert_eq!(cpu.query("nope"), None);
    }
}
