//! Core traits and types shared by the CPU cores and their observers.
//!
//! A CPU never owns its bus, and it never owns whatever is watching it.
//! Both are passed into every step, so tests can inspect and rewire either
//! side between instructions.

mod bus;
mod cpu;
mod events;
mod observable;

pub use bus::{Bus, IoBus, SimpleBus};
pub use cpu::Cpu;
pub use events::{
    AccessKind, AddressSpace, CpuEvents, Directive, EventFeed, MemoryAccess, NoEvents, StopReason,
};
pub use observable::{Observable, Value};
