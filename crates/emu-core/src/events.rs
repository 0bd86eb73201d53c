//! Event feeds a CPU emits while it executes.
//!
//! A CPU reports four things: it is about to fetch an instruction, it has
//! fetched one and is about to execute it, it has finished executing it,
//! and it is touching memory or an I/O port. An observer implementing
//! [`CpuEvents`] may answer each event; the CPU applies the answer before
//! carrying on.

use std::convert::Infallible;

/// The four event streams a CPU produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFeed {
    /// Before the opcode at PC is fetched.
    BeforeFetch,
    /// After the whole instruction has been fetched, before it runs.
    BeforeExecution,
    /// After the instruction has run.
    AfterExecution,
    /// Every memory and port read or write, before and after.
    MemoryAccess,
}

impl EventFeed {
    /// All feeds, in a fixed order.
    pub const ALL: [EventFeed; 4] = [
        EventFeed::BeforeFetch,
        EventFeed::BeforeExecution,
        EventFeed::AfterExecution,
        EventFeed::MemoryAccess,
    ];

    /// Position of this feed in [`EventFeed::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            EventFeed::BeforeFetch => 0,
            EventFeed::BeforeExecution => 1,
            EventFeed::AfterExecution => 2,
            EventFeed::MemoryAccess => 3,
        }
    }
}

/// Which address space an access targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    Memory,
    Port,
}

/// Phase and direction of an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    BeforeRead,
    AfterRead,
    BeforeWrite,
    AfterWrite,
}

/// One memory or port access, as seen (and possibly altered) by an observer.
///
/// - `BeforeRead`: setting `cancelled` skips the bus read and hands `value`
///   to the CPU instead.
/// - `AfterRead`: `value` is what the CPU receives.
/// - `BeforeWrite`: setting `cancelled` skips the bus write; otherwise
///   `value` is what gets written.
/// - `AfterWrite`: `cancelled` reports whether the write was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccess {
    pub space: AddressSpace,
    pub kind: AccessKind,
    pub address: u16,
    pub value: u8,
    pub cancelled: bool,
}

impl MemoryAccess {
    #[must_use]
    pub const fn new(space: AddressSpace, kind: AccessKind, address: u16, value: u8) -> Self {
        Self {
            space,
            kind,
            address,
            value,
            cancelled: false,
        }
    }
}

/// An observer's answer to an instruction event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Directive {
    /// Carry on normally.
    #[default]
    Continue,
    /// Execute a return instruction now instead of the pending instruction.
    ///
    /// Only honoured by the before-fetch and before-execution events.
    Return,
    /// Stop once the current instruction is complete.
    ///
    /// Only honoured by the after-execution event.
    Stop,
}

/// Why a run came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A HALT instruction was executed.
    Halted,
    /// An observer asked for execution to stop.
    Requested,
    /// A return popped the stack back past its base.
    ReturnWithEmptyStack,
}

/// Receiver of the events a CPU of type `C` emits.
///
/// Every method gets the CPU itself so the observer can read or change its
/// state. Returning an error aborts the current instruction; the CPU hands
/// the error back to whoever is driving it.
pub trait CpuEvents<C> {
    type Error;

    /// Whether the observer wants events from `feed` at all.
    ///
    /// CPUs skip building events for feeds nobody is attached to.
    fn is_attached(&self, feed: EventFeed) -> bool;

    fn before_fetch(&mut self, cpu: &mut C, address: u16) -> Result<Directive, Self::Error>;

    fn before_execution(
        &mut self,
        cpu: &mut C,
        address: u16,
        opcode: &[u8],
    ) -> Result<Directive, Self::Error>;

    fn after_execution(
        &mut self,
        cpu: &mut C,
        address: u16,
        opcode: &[u8],
    ) -> Result<Directive, Self::Error>;

    fn memory_access(&mut self, cpu: &mut C, access: &mut MemoryAccess) -> Result<(), Self::Error>;
}

/// Observer attached to nothing, for running a CPU bare.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl<C> CpuEvents<C> for NoEvents {
    type Error = Infallible;

    fn is_attached(&self, _feed: EventFeed) -> bool {
        false
    }

    fn before_fetch(&mut self, _cpu: &mut C, _address: u16) -> Result<Directive, Infallible> {
        Ok(Directive::Continue)
    }

    fn before_execution(
        &mut self,
        _cpu: &mut C,
        _address: u16,
        _opcode: &[u8],
    ) -> Result<Directive, Infallible> {
        Ok(Directive::Continue)
    }

    fn after_execution(
        &mut self,
        _cpu: &mut C,
        _address: u16,
        _opcode: &[u8],
    ) -> Result<Directive, Infallible> {
        Ok(Directive::Continue)
    }

    fn memory_access(&mut self, _cpu: &mut C, _access: &mut MemoryAccess) -> Result<(), Infallible> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_indices_follow_all() {
        for (i, feed) in EventFeed::ALL.iter().enumerate() {
            assert_eq!(feed.index(), i);
        }
    }

    #[test]
    fn no_events_is_never_attached() {
        let events = NoEvents;
        for feed in EventFeed::ALL {
            assert!(!<NoEvents as CpuEvents<()>>::is_attached(&events, feed));
        }
    }
}
