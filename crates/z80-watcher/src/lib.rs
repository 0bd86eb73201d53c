//! Watch, stub and verify Z80 machine code while it runs.
//!
//! A [`Z80Watcher`] is the event observer of a [`zilog_z80::Z80`]. Watches
//! are registered per event category (instruction fetch, before and after
//! execution, memory and port reads and writes), guarded by an address, a
//! symbol or a predicate. When a watch matches, its callbacks run in order
//! and may inspect or change the processor, replace values read, suppress
//! writes, force a return from the current routine or stop execution.
//! Afterwards, the number of times each watch was reached can be checked
//! against declared bounds.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use emu_core::{Cpu, SimpleBus};
//! use z80_watcher::Z80Watcher;
//! use zilog_z80::Z80;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut bus = SimpleBus::new();
//! // LD A, 'A'; CALL PRINT; LD A, 'B'; CALL PRINT; RET
//! bus.load(0x0100, &[0x3E, 0x41, 0xCD, 0x00, 0x02, 0x3E, 0x42, 0xCD, 0x00, 0x02, 0xC9]);
//! let mut cpu = Z80::new();
//! cpu.set_pc(0x0100);
//!
//! let printed = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&printed);
//!
//! let mut watcher = Z80Watcher::new();
//! watcher.symbols_mut()?.insert("PRINT", 0x0200);
//! watcher
//!     .before_executing_at("PRINT")?
//!     .run(move |ctx| {
//!         sink.borrow_mut().push(ctx.z80().regs().a);
//!         Ok(())
//!     })
//!     .execute_ret()
//!     .expected_exactly(2);
//!
//! cpu.run(&mut bus, &mut watcher)?;
//! watcher.verify_all_expectations()?;
//! assert_eq!(*printed.borrow(), b"AB");
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod expectation;
mod handle;
mod symbols;
mod watch;
mod watcher;

pub use context::{
    AfterExecution, AfterExecutionContext, AfterRead, AfterReadContext, AfterWrite,
    AfterWriteContext, BeforeExecution, BeforeExecutionContext, BeforeFetch, BeforeFetchContext,
    BeforeRead, BeforeReadContext, BeforeWrite, BeforeWriteContext, Category, ContextSnapshot,
    EventContext, EventDetail, Opcode, ReturnDetail,
};
pub use error::{Error, Phase, Result, WatchExecutionError};
pub use expectation::ExpectationError;
pub use handle::WatchHandle;
pub use symbols::{Location, Symbols};
pub use watch::{Callback, Predicate, WatchId};
pub use watcher::Z80Watcher;
