//! Instruction-stepped Z80 CPU emulator.
//!
//! Each call to `step()` executes exactly one instruction and reports it to
//! an [`emu_core::CpuEvents`] observer: before fetch, before execution,
//! after execution, and around every memory and port access.

mod alu;
mod cpu;
mod flags;
mod registers;

pub use cpu::Z80;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::Registers;
