//! Fluent configuration of a freshly registered watch.

// Dropping a handle is how configuration ends.
#![allow(clippy::return_self_not_must_use)]

use crate::context::{
    AfterExecution, AfterRead, AfterReadContext, BeforeRead, BeforeReadContext, BeforeWrite,
    BeforeWriteContext, EventContext, EventDetail, ReturnDetail,
};
use crate::watch::{Watch, WatchId};

/// Builder returned by every registration method.
///
/// The handle borrows the watcher, so a watch is configured completely
/// before the next one is registered. Each method returns the handle so
/// calls can be chained; dropping it finishes the configuration.
///
/// Terminal actions only exist where they make sense: `execute_ret` on
/// before-fetch and before-execution watches, `stop_execution` on
/// after-execution watches, and the value overrides on the matching
/// memory and port watches.
pub struct WatchHandle<'w, D> {
    id: WatchId,
    watch: &'w mut Watch<D>,
}

impl<'w, D: EventDetail> WatchHandle<'w, D> {
    pub(crate) fn new(id: WatchId, watch: &'w mut Watch<D>) -> Self {
        Self { id, watch }
    }

    #[must_use]
    pub fn id(&self) -> WatchId {
        self.id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.watch.reach.display_name
    }

    #[must_use]
    pub fn times_reached(&self) -> u64 {
        self.watch.reach.times_reached
    }

    /// Append a callback. Callbacks run in the order they were added.
    pub fn run<F>(self, callback: F) -> Self
    where
        F: FnMut(&mut EventContext<'_, D>) -> anyhow::Result<()> + 'static,
    {
        self.watch.callbacks.push(Box::new(callback));
        self
    }

    /// Name used in expectation and execution errors.
    pub fn named(self, name: impl Into<String>) -> Self {
        self.watch.reach.display_name = name.into();
        self
    }

    pub fn expected_between(self, min: u64, max: u64) -> Self {
        self.watch.reach.set_bounds(min, Some(max));
        self
    }

    pub fn expected_at_least(self, min: u64) -> Self {
        self.watch.reach.set_bounds(min, None);
        self
    }

    pub fn expected_at_most(self, max: u64) -> Self {
        self.watch.reach.set_bounds(0, Some(max));
        self
    }

    pub fn expected_exactly(self, times: u64) -> Self {
        self.watch.reach.set_bounds(times, Some(times));
        self
    }

    /// Reached at least once.
    pub fn expected(self) -> Self {
        self.expected_at_least(1)
    }

    /// Never reached.
    pub fn not_expected(self) -> Self {
        self.expected_exactly(0)
    }
}

impl<D: ReturnDetail> WatchHandle<'_, D> {
    /// Return from the current routine instead of running the instruction.
    pub fn execute_ret(self) -> Self {
        self.run(|ctx| {
            ctx.execute_ret();
            Ok(())
        })
    }

    pub fn then_return(self) -> Self {
        self.execute_ret()
    }
}

impl WatchHandle<'_, AfterExecution> {
    pub fn stop_execution(self) -> Self {
        self.run(|ctx| {
            ctx.stop_execution();
            Ok(())
        })
    }
}

impl WatchHandle<'_, BeforeRead> {
    /// Skip the bus read and hand `value` to the program.
    pub fn suppress_memory_access_and_return(self, value: u8) -> Self {
        self.run(move |ctx| {
            ctx.set_value(Some(value));
            Ok(())
        })
    }

    pub fn suppress_memory_access_and_return_using<F>(self, mut supply: F) -> Self
    where
        F: FnMut(&BeforeReadContext<'_>) -> anyhow::Result<u8> + 'static,
    {
        self.run(move |ctx| {
            let value = supply(ctx)?;
            ctx.set_value(Some(value));
            Ok(())
        })
    }
}

impl WatchHandle<'_, AfterRead> {
    /// Deliver `value` to the program in place of what was read.
    pub fn replace_obtained_value_with(self, value: u8) -> Self {
        self.run(move |ctx| {
            ctx.set_value(value);
            Ok(())
        })
    }

    pub fn replace_obtained_value_using<F>(self, mut supply: F) -> Self
    where
        F: FnMut(&AfterReadContext<'_>) -> anyhow::Result<u8> + 'static,
    {
        self.run(move |ctx| {
            let value = supply(ctx)?;
            ctx.set_value(value);
            Ok(())
        })
    }
}

impl WatchHandle<'_, BeforeWrite> {
    pub fn suppress_write(self) -> Self {
        self.run(|ctx| {
            ctx.set_value(None);
            Ok(())
        })
    }

    /// Write `value` instead of what the program is writing.
    pub fn actually_write(self, value: u8) -> Self {
        self.run(move |ctx| {
            ctx.set_value(Some(value));
            Ok(())
        })
    }

    pub fn actually_write_using<F>(self, mut supply: F) -> Self
    where
        F: FnMut(&BeforeWriteContext<'_>) -> anyhow::Result<u8> + 'static,
    {
        self.run(move |ctx| {
            let value = supply(ctx)?;
            ctx.set_value(Some(value));
            Ok(())
        })
    }
}
