//! CPU core trait.

use crate::{CpuEvents, IoBus, StopReason};

/// A CPU core that executes whole instructions.
///
/// The bus and the event observer are passed in, not owned. Observers see
/// the CPU itself on every event, so they can inspect or change registers
/// while an instruction is in flight.
pub trait Cpu: Sized {
    /// The type used for register inspection.
    type Registers;

    /// Execute one instruction.
    ///
    /// Returns `Some` when execution must stop after this instruction. Any
    /// error raised by the observer aborts the instruction and is returned
    /// unchanged.
    fn step<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
    ) -> Result<Option<StopReason>, E::Error>;

    /// Step until a stop condition is reached.
    fn run<B: IoBus, E: CpuEvents<Self>>(
        &mut self,
        bus: &mut B,
        events: &mut E,
    ) -> Result<StopReason, E::Error> {
        loop {
            if let Some(reason) = self.step(bus, events)? {
                return Ok(reason);
            }
        }
    }

    /// Returns the current program counter.
    fn pc(&self) -> u16;

    /// Returns a snapshot of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true if the CPU is halted.
    fn is_halted(&self) -> bool;

    /// Reset the CPU to its initial state.
    fn reset(&mut self);
}
