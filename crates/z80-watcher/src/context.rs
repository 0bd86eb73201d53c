//! Contexts handed to predicates and callbacks, one per event occurrence.
//!
//! An [`EventContext`] carries the parts every event shares (address,
//! reach count, the processor and the symbol table) plus a detail value
//! whose type depends on the event category. Category-specific accessors
//! live on the concrete aliases, so a callback for an after-execution
//! watch cannot ask for a return and a read callback cannot cancel a
//! write.

use std::fmt;

use smallvec::SmallVec;
use zilog_z80::Z80;

use crate::symbols::Symbols;

/// Instruction bytes: prefixes, opcode, displacement and immediates.
pub type Opcode = SmallVec<[u8; 4]>;

/// The event category a watch is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    BeforeFetch,
    BeforeExecution,
    AfterExecution,
    BeforeMemoryRead,
    AfterMemoryRead,
    BeforeMemoryWrite,
    AfterMemoryWrite,
    BeforePortRead,
    AfterPortRead,
    BeforePortWrite,
    AfterPortWrite,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::BeforeFetch,
        Category::BeforeExecution,
        Category::AfterExecution,
        Category::BeforeMemoryRead,
        Category::AfterMemoryRead,
        Category::BeforeMemoryWrite,
        Category::AfterMemoryWrite,
        Category::BeforePortRead,
        Category::AfterPortRead,
        Category::BeforePortWrite,
        Category::AfterPortWrite,
    ];

    /// Display name given to watches that were not explicitly named.
    #[must_use]
    pub const fn default_name(self) -> &'static str {
        match self {
            Category::BeforeFetch => "BeforeInstructionFetch",
            Category::BeforeExecution => "BeforeCodeExecution",
            Category::AfterExecution => "AfterCodeExecution",
            Category::BeforeMemoryRead => "BeforeMemoryRead",
            Category::AfterMemoryRead => "AfterMemoryRead",
            Category::BeforeMemoryWrite => "BeforeMemoryWrite",
            Category::AfterMemoryWrite => "AfterMemoryWrite",
            Category::BeforePortRead => "BeforePortRead",
            Category::AfterPortRead => "AfterPortRead",
            Category::BeforePortWrite => "BeforePortWrite",
            Category::AfterPortWrite => "AfterPortWrite",
        }
    }

    /// The CPU event feed that produces occurrences of this category.
    #[must_use]
    pub const fn feed(self) -> emu_core::EventFeed {
        use emu_core::EventFeed;
        match self {
            Category::BeforeFetch => EventFeed::BeforeFetch,
            Category::BeforeExecution => EventFeed::BeforeExecution,
            Category::AfterExecution => EventFeed::AfterExecution,
            _ => EventFeed::MemoryAccess,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

/// Per-category part of a context.
pub trait EventDetail: 'static {
    fn opcode(&self) -> Option<&[u8]> {
        None
    }

    fn value(&self) -> Option<u8> {
        None
    }

    /// Whether a callback asked for execution to stop.
    fn must_stop(&self) -> bool {
        false
    }
}

/// Details of events that can be answered by forcing a return.
pub trait ReturnDetail: EventDetail {
    fn request_ret(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct BeforeFetch {
    ret_requested: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BeforeExecution {
    opcode: Opcode,
    ret_requested: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AfterExecution {
    opcode: Opcode,
    must_stop: bool,
}

/// `value` is `None` until a callback supplies a value to use in place of
/// the bus read.
#[derive(Debug, Clone, Default)]
pub struct BeforeRead {
    value: Option<u8>,
}

/// `value` is what the program receives.
#[derive(Debug, Clone, Default)]
pub struct AfterRead {
    value: u8,
}

/// `value` is what will be written; `None` suppresses the write.
#[derive(Debug, Clone, Default)]
pub struct BeforeWrite {
    value: Option<u8>,
}

/// `value` is what was written, or `None` if the write was suppressed.
#[derive(Debug, Clone, Default)]
pub struct AfterWrite {
    value: Option<u8>,
}

impl BeforeFetch {
    pub(crate) fn ret_requested(&self) -> bool {
        self.ret_requested
    }
}

impl BeforeExecution {
    pub(crate) fn new(opcode: &[u8]) -> Self {
        Self {
            opcode: Opcode::from_slice(opcode),
            ret_requested: false,
        }
    }

    pub(crate) fn ret_requested(&self) -> bool {
        self.ret_requested
    }
}

impl AfterExecution {
    pub(crate) fn new(opcode: &[u8]) -> Self {
        Self {
            opcode: Opcode::from_slice(opcode),
            must_stop: false,
        }
    }
}

impl BeforeRead {
    pub(crate) fn value(&self) -> Option<u8> {
        self.value
    }
}

impl AfterRead {
    pub(crate) fn new(value: u8) -> Self {
        Self { value }
    }

    pub(crate) fn value(&self) -> u8 {
        self.value
    }
}

impl BeforeWrite {
    pub(crate) fn new(value: u8) -> Self {
        Self { value: Some(value) }
    }

    pub(crate) fn value(&self) -> Option<u8> {
        self.value
    }
}

impl AfterWrite {
    pub(crate) fn new(value: Option<u8>) -> Self {
        Self { value }
    }
}

impl EventDetail for BeforeFetch {}

impl EventDetail for BeforeExecution {
    fn opcode(&self) -> Option<&[u8]> {
        Some(&self.opcode)
    }
}

impl EventDetail for AfterExecution {
    fn opcode(&self) -> Option<&[u8]> {
        Some(&self.opcode)
    }

    fn must_stop(&self) -> bool {
        self.must_stop
    }
}

impl EventDetail for BeforeRead {
    fn value(&self) -> Option<u8> {
        self.value
    }
}

impl EventDetail for AfterRead {
    fn value(&self) -> Option<u8> {
        Some(self.value)
    }
}

impl EventDetail for BeforeWrite {
    fn value(&self) -> Option<u8> {
        self.value
    }
}

impl EventDetail for AfterWrite {
    fn value(&self) -> Option<u8> {
        self.value
    }
}

impl ReturnDetail for BeforeFetch {
    fn request_ret(&mut self) {
        self.ret_requested = true;
    }
}

impl ReturnDetail for BeforeExecution {
    fn request_ret(&mut self) {
        self.ret_requested = true;
    }
}

/// One occurrence of an event, as seen by predicates and callbacks.
pub struct EventContext<'a, D> {
    category: Category,
    address: u16,
    times_reached: u64,
    z80: &'a mut Z80,
    symbols: &'a mut Symbols,
    pub(crate) detail: D,
}

pub type BeforeFetchContext<'a> = EventContext<'a, BeforeFetch>;
pub type BeforeExecutionContext<'a> = EventContext<'a, BeforeExecution>;
pub type AfterExecutionContext<'a> = EventContext<'a, AfterExecution>;
pub type BeforeReadContext<'a> = EventContext<'a, BeforeRead>;
pub type AfterReadContext<'a> = EventContext<'a, AfterRead>;
pub type BeforeWriteContext<'a> = EventContext<'a, BeforeWrite>;
pub type AfterWriteContext<'a> = EventContext<'a, AfterWrite>;

impl<'a, D: EventDetail> EventContext<'a, D> {
    pub(crate) fn new(
        category: Category,
        address: u16,
        z80: &'a mut Z80,
        symbols: &'a mut Symbols,
        detail: D,
    ) -> Self {
        Self {
            category,
            address,
            times_reached: 0,
            z80,
            symbols,
            detail,
        }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Instruction address for fetch and execution events; memory address or
    /// port number for access events.
    #[must_use]
    pub fn address(&self) -> u16 {
        self.address
    }

    /// How many times the watch being run has been reached, this occurrence
    /// included. Zero while predicates are being evaluated.
    #[must_use]
    pub fn times_reached(&self) -> u64 {
        self.times_reached
    }

    /// Overwrite the reach count of the watch being run.
    pub fn set_times_reached(&mut self, times: u64) {
        self.times_reached = times;
    }

    #[must_use]
    pub fn z80(&self) -> &Z80 {
        self.z80
    }

    pub fn z80_mut(&mut self) -> &mut Z80 {
        self.z80
    }

    #[must_use]
    pub fn symbols(&self) -> &Symbols {
        self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut Symbols {
        self.symbols
    }

    /// Owned copy of this context's state, for error reports.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            category: self.category,
            address: self.address,
            opcode: self.detail.opcode().map(Opcode::from_slice),
            value: self.detail.value(),
            times_reached: self.times_reached,
        }
    }
}

impl<D: ReturnDetail> EventContext<'_, D> {
    /// Execute a return instruction in place of the pending instruction.
    pub fn execute_ret(&mut self) {
        self.detail.request_ret();
    }
}

impl EventContext<'_, BeforeExecution> {
    #[must_use]
    pub fn opcode(&self) -> &[u8] {
        &self.detail.opcode
    }
}

impl EventContext<'_, AfterExecution> {
    #[must_use]
    pub fn opcode(&self) -> &[u8] {
        &self.detail.opcode
    }

    /// Stop the CPU once the current instruction is complete.
    pub fn stop_execution(&mut self) {
        self.detail.must_stop = true;
    }

    #[must_use]
    pub fn must_stop(&self) -> bool {
        self.detail.must_stop
    }

    pub fn set_must_stop(&mut self, stop: bool) {
        self.detail.must_stop = stop;
    }
}

impl EventContext<'_, BeforeRead> {
    /// The value to hand to the program instead of reading the bus, if any.
    #[must_use]
    pub fn value(&self) -> Option<u8> {
        self.detail.value
    }

    /// `Some` skips the bus read and delivers this value; `None` reads the
    /// bus normally.
    pub fn set_value(&mut self, value: Option<u8>) {
        self.detail.value = value;
    }
}

impl EventContext<'_, AfterRead> {
    #[must_use]
    pub fn value(&self) -> u8 {
        self.detail.value
    }

    pub fn set_value(&mut self, value: u8) {
        self.detail.value = value;
    }
}

impl EventContext<'_, BeforeWrite> {
    #[must_use]
    pub fn value(&self) -> Option<u8> {
        self.detail.value
    }

    /// `None` suppresses the write.
    pub fn set_value(&mut self, value: Option<u8>) {
        self.detail.value = value;
    }
}

impl EventContext<'_, AfterWrite> {
    #[must_use]
    pub fn value(&self) -> Option<u8> {
        self.detail.value
    }
}

impl<D: EventDetail> fmt::Debug for EventContext<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("category", &self.category)
            .field("address", &format_args!("{:#06X}", self.address))
            .field("opcode", &self.detail.opcode())
            .field("value", &self.detail.value())
            .field("times_reached", &self.times_reached)
            .finish_non_exhaustive()
    }
}

/// Owned copy of a context, detached from the processor and symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub category: Category,
    pub address: u16,
    pub opcode: Option<Opcode>,
    pub value: Option<u8>,
    pub times_reached: u64,
}

impl fmt::Display for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {:#06X}", self.category, self.address)?;
        if let Some(opcode) = &self.opcode {
            write!(f, ", opcode {opcode:02X?}")?;
        }
        if let Some(value) = self.value {
            write!(f, ", value {value:#04X}")?;
        }
        Ok(())
    }
}
