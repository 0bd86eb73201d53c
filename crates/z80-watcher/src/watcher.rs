//! The watcher: registration, event dispatch and expectation checks.

use emu_core::{AccessKind, AddressSpace, CpuEvents, Directive, EventFeed, MemoryAccess};
use log::{debug, trace};
use smallvec::SmallVec;
use zilog_z80::Z80;

use crate::context::{
    AfterExecution, AfterRead, AfterWrite, BeforeExecution, BeforeFetch, BeforeRead, BeforeWrite,
    Category, EventContext, EventDetail,
};
use crate::error::{Error, Phase, Result, WatchExecutionError};
use crate::expectation::{ExpectationError, Reach};
use crate::handle::WatchHandle;
use crate::symbols::{Location, Symbols};
use crate::watch::{Predicate, Watch, WatchId};

/// One list per category, in registration order.
#[derive(Debug, Default)]
struct WatchLists {
    before_fetch: Vec<Watch<BeforeFetch>>,
    before_execution: Vec<Watch<BeforeExecution>>,
    after_execution: Vec<Watch<AfterExecution>>,
    before_memory_read: Vec<Watch<BeforeRead>>,
    after_memory_read: Vec<Watch<AfterRead>>,
    before_memory_write: Vec<Watch<BeforeWrite>>,
    after_memory_write: Vec<Watch<AfterWrite>>,
    before_port_read: Vec<Watch<BeforeRead>>,
    after_port_read: Vec<Watch<AfterRead>>,
    before_port_write: Vec<Watch<BeforeWrite>>,
    after_port_write: Vec<Watch<AfterWrite>>,
}

impl WatchLists {
    fn reaches(&self) -> impl Iterator<Item = &Reach> {
        fn reach<D>(watch: &Watch<D>) -> &Reach {
            &watch.reach
        }
        self.before_fetch
            .iter()
            .map(reach)
            .chain(self.before_execution.iter().map(reach))
            .chain(self.after_execution.iter().map(reach))
            .chain(self.before_memory_read.iter().map(reach))
            .chain(self.after_memory_read.iter().map(reach))
            .chain(self.before_memory_write.iter().map(reach))
            .chain(self.after_memory_write.iter().map(reach))
            .chain(self.before_port_read.iter().map(reach))
            .chain(self.after_port_read.iter().map(reach))
            .chain(self.before_port_write.iter().map(reach))
            .chain(self.after_port_write.iter().map(reach))
    }

    fn reaches_mut(&mut self) -> impl Iterator<Item = &mut Reach> {
        fn reach<D>(watch: &mut Watch<D>) -> &mut Reach {
            &mut watch.reach
        }
        self.before_fetch
            .iter_mut()
            .map(reach)
            .chain(self.before_execution.iter_mut().map(reach))
            .chain(self.after_execution.iter_mut().map(reach))
            .chain(self.before_memory_read.iter_mut().map(reach))
            .chain(self.after_memory_read.iter_mut().map(reach))
            .chain(self.before_memory_write.iter_mut().map(reach))
            .chain(self.after_memory_write.iter_mut().map(reach))
            .chain(self.before_port_read.iter_mut().map(reach))
            .chain(self.after_port_read.iter_mut().map(reach))
            .chain(self.before_port_write.iter_mut().map(reach))
            .chain(self.after_port_write.iter_mut().map(reach))
    }

    fn reach(&self, category: Category, index: usize) -> Option<&Reach> {
        fn at<D>(list: &[Watch<D>], index: usize) -> Option<&Reach> {
            list.get(index).map(|watch| &watch.reach)
        }
        match category {
            Category::BeforeFetch => at(&self.before_fetch, index),
            Category::BeforeExecution => at(&self.before_execution, index),
            Category::AfterExecution => at(&self.after_execution, index),
            Category::BeforeMemoryRead => at(&self.before_memory_read, index),
            Category::AfterMemoryRead => at(&self.after_memory_read, index),
            Category::BeforeMemoryWrite => at(&self.before_memory_write, index),
            Category::AfterMemoryWrite => at(&self.after_memory_write, index),
            Category::BeforePortRead => at(&self.before_port_read, index),
            Category::AfterPortRead => at(&self.after_port_read, index),
            Category::BeforePortWrite => at(&self.before_port_write, index),
            Category::AfterPortWrite => at(&self.after_port_write, index),
        }
    }

    fn len(&self) -> usize {
        self.reaches().count()
    }
}

/// Generates the three registration methods of one category: unconditional,
/// by location, and by predicate.
macro_rules! registration {
    (
        $(#[doc = $doc:literal])*
        $category:ident, $detail:ty, $field:ident => $always:ident, $at:ident, $where:ident
    ) => {
        $(#[doc = $doc])*
        pub fn $always(&mut self) -> Result<WatchHandle<'_, $detail>> {
            self.$where(|_| Ok(true))
        }

        #[doc = concat!("Like [`Self::", stringify!($always), "`], for occurrences at `location` only.")]
        ///
        /// Symbolic locations are looked up every time the watch is matched.
        pub fn $at(&mut self, location: impl Into<Location>) -> Result<WatchHandle<'_, $detail>> {
            let location = location.into();
            self.$where(move |ctx| Ok(ctx.address() == location.resolve(ctx.symbols())?))
        }

        #[doc = concat!("Like [`Self::", stringify!($always), "`], for occurrences where `predicate` holds.")]
        pub fn $where<P>(&mut self, predicate: P) -> Result<WatchHandle<'_, $detail>>
        where
            P: FnMut(&EventContext<'_, $detail>) -> anyhow::Result<bool> + 'static,
        {
            fn select(lists: &mut WatchLists) -> &mut Vec<Watch<$detail>> {
                &mut lists.$field
            }
            self.register(Category::$category, Box::new(predicate), select)
        }
    };
}

/// Watches a [`Z80`] through the events it emits.
///
/// Pass the watcher as the event observer of [`emu_core::Cpu::run`] or
/// [`emu_core::Cpu::step`]. A feed is only attached once a watch needs it,
/// so a watcher with no watches costs the CPU nothing.
#[derive(Debug, Default)]
pub struct Z80Watcher {
    watches: WatchLists,
    symbols: Symbols,
    /// Watches registered per feed since the last removal.
    subscriptions: [usize; 4],
    generation: u32,
    disposed: bool,
}

impl Z80Watcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_symbols(symbols: Symbols) -> Self {
        Self {
            symbols,
            ..Self::default()
        }
    }

    pub fn symbols(&self) -> Result<&Symbols> {
        self.ensure_live()?;
        Ok(&self.symbols)
    }

    pub fn symbols_mut(&mut self) -> Result<&mut Symbols> {
        self.ensure_live()?;
        Ok(&mut self.symbols)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Number of registered watches across all categories.
    pub fn watch_count(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.watches.len())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    fn subscribe(&mut self, feed: EventFeed) {
        let count = &mut self.subscriptions[feed.index()];
        if *count == 0 {
            debug!("attaching to the {feed:?} feed");
        }
        *count += 1;
    }

    fn unsubscribe_all(&mut self) {
        for feed in EventFeed::ALL {
            if self.subscriptions[feed.index()] > 0 {
                debug!("detaching from the {feed:?} feed");
            }
        }
        self.subscriptions = [0; 4];
    }

    fn register<D: EventDetail>(
        &mut self,
        category: Category,
        predicate: Predicate<D>,
        select: fn(&mut WatchLists) -> &mut Vec<Watch<D>>,
    ) -> Result<WatchHandle<'_, D>> {
        self.ensure_live()?;
        self.subscribe(category.feed());

        let generation = self.generation;
        let list = select(&mut self.watches);
        let index = list.len();
        list.push(Watch::new(category, predicate));
        trace!("registered {category} watch #{index}");

        let id = WatchId {
            category,
            index,
            generation,
        };
        Ok(WatchHandle::new(id, &mut list[index]))
    }

    registration! {
        /// Watch for the CPU being about to fetch an instruction.
        BeforeFetch, BeforeFetch, before_fetch =>
            before_fetching_instruction, before_fetching_instruction_at, before_fetching_instruction_where
    }

    registration! {
        /// Watch for a fetched instruction being about to execute.
        BeforeExecution, BeforeExecution, before_execution =>
            before_executing, before_executing_at, before_executing_where
    }

    registration! {
        /// Watch for an instruction having executed.
        AfterExecution, AfterExecution, after_execution =>
            after_executing, after_executing_at, after_executing_where
    }

    registration! {
        /// Watch for memory being about to be read.
        BeforeMemoryRead, BeforeRead, before_memory_read =>
            before_reading_memory, before_reading_memory_at, before_reading_memory_where
    }

    registration! {
        /// Watch for memory having been read.
        AfterMemoryRead, AfterRead, after_memory_read =>
            after_reading_memory, after_reading_memory_at, after_reading_memory_where
    }

    registration! {
        /// Watch for memory being about to be written.
        BeforeMemoryWrite, BeforeWrite, before_memory_write =>
            before_writing_memory, before_writing_memory_at, before_writing_memory_where
    }

    registration! {
        /// Watch for memory having been written (or the write suppressed).
        AfterMemoryWrite, AfterWrite, after_memory_write =>
            after_writing_memory, after_writing_memory_at, after_writing_memory_where
    }

    registration! {
        /// Watch for a port being about to be read.
        BeforePortRead, BeforeRead, before_port_read =>
            before_reading_port, before_reading_port_at, before_reading_port_where
    }

    registration! {
        /// Watch for a port having been read.
        AfterPortRead, AfterRead, after_port_read =>
            after_reading_port, after_reading_port_at, after_reading_port_where
    }

    registration! {
        /// Watch for a port being about to be written.
        BeforePortWrite, BeforeWrite, before_port_write =>
            before_writing_port, before_writing_port_at, before_writing_port_where
    }

    registration! {
        /// Watch for a port having been written (or the write suppressed).
        AfterPortWrite, AfterWrite, after_port_write =>
            after_writing_port, after_writing_port_at, after_writing_port_where
    }

    /// How many times the watch `id` has been reached.
    pub fn times_reached(&self, id: WatchId) -> Result<u64> {
        self.ensure_live()?;
        if id.generation != self.generation {
            return Err(Error::UnknownWatch(id));
        }
        self.watches
            .reach(id.category, id.index)
            .map(|reach| reach.times_reached)
            .ok_or(Error::UnknownWatch(id))
    }

    /// Check every watch against its expected number of reaches.
    ///
    /// Fails with the first violation, taking categories in a fixed order
    /// and watches in registration order.
    pub fn verify_all_expectations(&self) -> Result<()> {
        self.ensure_live()?;
        for reach in self.watches.reaches() {
            reach.verify()?;
        }
        Ok(())
    }

    /// Every expectation violation, in the order `verify_all_expectations`
    /// would find them.
    pub fn expectation_failures(&self) -> Result<Vec<ExpectationError>> {
        self.ensure_live()?;
        Ok(self
            .watches
            .reaches()
            .filter_map(|reach| reach.verify().err())
            .collect())
    }

    /// Zero every reach counter. Bounds and callbacks stay.
    pub fn reset_all_reach_counts(&mut self) -> Result<()> {
        self.ensure_live()?;
        for reach in self.watches.reaches_mut() {
            reach.times_reached = 0;
        }
        Ok(())
    }

    /// Drop every watch and detach from every feed. Symbols are kept.
    pub fn remove_all_watches(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.clear();
        Ok(())
    }

    fn clear(&mut self) {
        let removed = self.watches.len();
        self.watches = WatchLists::default();
        self.unsubscribe_all();
        self.generation = self.generation.wrapping_add(1);
        debug!("removed {removed} watches");
    }

    /// Detach and discard all watches. Every later operation fails with
    /// [`Error::Disposed`]. Disposing twice is harmless.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.clear();
        self.disposed = true;
        debug!("watcher disposed");
    }
}

/// Run one occurrence through the watches of its category.
///
/// Predicates are all evaluated first, against the context as the CPU
/// produced it. Matching watches then run in registration order, each
/// callback seeing the changes of the ones before it. A stop request ends
/// the dispatch after the callback that made it.
fn dispatch<D: EventDetail>(
    watches: &mut [Watch<D>],
    ctx: &mut EventContext<'_, D>,
) -> Result<(), WatchExecutionError> {
    let mut matching = SmallVec::<[usize; 8]>::new();
    for (index, watch) in watches.iter_mut().enumerate() {
        match (watch.predicate)(ctx) {
            Ok(true) => matching.push(index),
            Ok(false) => {}
            Err(source) => {
                return Err(WatchExecutionError::new(
                    &watch.reach.display_name,
                    Phase::Matching,
                    ctx.snapshot(),
                    source,
                ));
            }
        }
    }

    for index in matching {
        let Watch {
            callbacks, reach, ..
        } = &mut watches[index];
        reach.times_reached += 1;
        ctx.set_times_reached(reach.times_reached);
        trace!(
            "{} reached at {:#06X} ({} times)",
            reach.display_name,
            ctx.address(),
            reach.times_reached
        );

        for callback in callbacks.iter_mut() {
            if let Err(source) = callback(ctx) {
                return Err(WatchExecutionError::new(
                    &reach.display_name,
                    Phase::Callback,
                    ctx.snapshot(),
                    source,
                ));
            }
            reach.times_reached = ctx.times_reached();
            if ctx.detail.must_stop() {
                trace!("{} requested a stop", reach.display_name);
                return Ok(());
            }
        }
    }
    Ok(())
}

impl CpuEvents<Z80> for Z80Watcher {
    type Error = WatchExecutionError;

    fn is_attached(&self, feed: EventFeed) -> bool {
        self.subscriptions[feed.index()] > 0
    }

    fn before_fetch(&mut self, cpu: &mut Z80, address: u16) -> Result<Directive, Self::Error> {
        let Self {
            watches, symbols, ..
        } = self;
        let mut ctx = EventContext::new(
            Category::BeforeFetch,
            address,
            cpu,
            symbols,
            BeforeFetch::default(),
        );
        dispatch(&mut watches.before_fetch, &mut ctx)?;
        if ctx.detail.ret_requested() {
            trace!("forcing a return at {address:#06X} before fetch");
            return Ok(Directive::Return);
        }
        Ok(Directive::Continue)
    }

    fn before_execution(
        &mut self,
        cpu: &mut Z80,
        address: u16,
        opcode: &[u8],
    ) -> Result<Directive, Self::Error> {
        let Self {
            watches, symbols, ..
        } = self;
        let mut ctx = EventContext::new(
            Category::BeforeExecution,
            address,
            cpu,
            symbols,
            BeforeExecution::new(opcode),
        );
        dispatch(&mut watches.before_execution, &mut ctx)?;
        if ctx.detail.ret_requested() {
            trace!("forcing a return at {address:#06X} before execution");
            return Ok(Directive::Return);
        }
        Ok(Directive::Continue)
    }

    fn after_execution(
        &mut self,
        cpu: &mut Z80,
        address: u16,
        opcode: &[u8],
    ) -> Result<Directive, Self::Error> {
        let Self {
            watches, symbols, ..
        } = self;
        let mut ctx = EventContext::new(
            Category::AfterExecution,
            address,
            cpu,
            symbols,
            AfterExecution::new(opcode),
        );
        dispatch(&mut watches.after_execution, &mut ctx)?;
        if ctx.detail.must_stop() {
            trace!("stopping after {address:#06X}");
            return Ok(Directive::Stop);
        }
        Ok(Directive::Continue)
    }

    fn memory_access(&mut self, cpu: &mut Z80, access: &mut MemoryAccess) -> Result<(), Self::Error> {
        let Self {
            watches, symbols, ..
        } = self;
        let port = access.space == AddressSpace::Port;
        let address = access.address;

        match access.kind {
            AccessKind::BeforeRead => {
                let (category, list) = if port {
                    (Category::BeforePortRead, &mut watches.before_port_read)
                } else {
                    (Category::BeforeMemoryRead, &mut watches.before_memory_read)
                };
                if list.is_empty() {
                    return Ok(());
                }
                let mut ctx =
                    EventContext::new(category, address, cpu, symbols, BeforeRead::default());
                dispatch(list, &mut ctx)?;
                if let Some(value) = ctx.detail.value() {
                    trace!("{category} at {address:#06X} answered with {value:#04X}");
                    access.value = value;
                    access.cancelled = true;
                }
            }
            AccessKind::AfterRead => {
                let (category, list) = if port {
                    (Category::AfterPortRead, &mut watches.after_port_read)
                } else {
                    (Category::AfterMemoryRead, &mut watches.after_memory_read)
                };
                if list.is_empty() {
                    return Ok(());
                }
                let mut ctx = EventContext::new(
                    category,
                    address,
                    cpu,
                    symbols,
                    AfterRead::new(access.value),
                );
                dispatch(list, &mut ctx)?;
                let value = ctx.detail.value();
                if value != access.value {
                    trace!("{category} at {address:#06X} replaced with {value:#04X}");
                    access.value = value;
                }
            }
            AccessKind::BeforeWrite => {
                let (category, list) = if port {
                    (Category::BeforePortWrite, &mut watches.before_port_write)
                } else {
                    (Category::BeforeMemoryWrite, &mut watches.before_memory_write)
                };
                if list.is_empty() {
                    return Ok(());
                }
                let mut ctx = EventContext::new(
                    category,
                    address,
                    cpu,
                    symbols,
                    BeforeWrite::new(access.value),
                );
                dispatch(list, &mut ctx)?;
                match ctx.detail.value() {
                    Some(value) => access.value = value,
                    None => {
                        trace!("{category} at {address:#06X} suppressed");
                        access.cancelled = true;
                    }
                }
            }
            AccessKind::AfterWrite => {
                let (category, list) = if port {
                    (Category::AfterPortWrite, &mut watches.after_port_write)
                } else {
                    (Category::AfterMemoryWrite, &mut watches.after_memory_write)
                };
                if list.is_empty() {
                    return Ok(());
                }
                let written = (!access.cancelled).then_some(access.value);
                let mut ctx =
                    EventContext::new(category, address, cpu, symbols, AfterWrite::new(written));
                dispatch(list, &mut ctx)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feeds_attach_on_first_registration() {
        let mut watcher = Z80Watcher::new();
        assert!(!watcher.is_attached(EventFeed::MemoryAccess));

        let _ = watcher.before_writing_port().unwrap();
        let _ = watcher.after_reading_memory().unwrap();
        assert!(watcher.is_attached(EventFeed::MemoryAccess));
        assert!(!watcher.is_attached(EventFeed::BeforeFetch));
        assert_eq!(watcher.subscriptions[EventFeed::MemoryAccess.index()], 2);
    }

    #[test]
    fn remove_all_watches_detaches_and_keeps_symbols() {
        let mut watcher = Z80Watcher::new();
        watcher.symbols_mut().unwrap().insert("LOOP", 0x0103);
        let _ = watcher.before_executing_at("LOOP").unwrap();
        assert_eq!(watcher.watch_count().unwrap(), 1);

        watcher.remove_all_watches().unwrap();
        assert_eq!(watcher.watch_count().unwrap(), 0);
        assert!(EventFeed::ALL.iter().all(|&feed| !watcher.is_attached(feed)));
        assert_eq!(watcher.symbols().unwrap().get("LOOP").unwrap(), 0x0103);
    }

    #[test]
    fn stale_ids_are_rejected() {
        let mut watcher = Z80Watcher::new();
        let id = watcher.after_executing().unwrap().id();
        assert_eq!(watcher.times_reached(id).unwrap(), 0);

        watcher.remove_all_watches().unwrap();
        let _ = watcher.after_executing().unwrap();
        assert!(matches!(watcher.times_reached(id), Err(Error::UnknownWatch(_))));
    }

    #[test]
    fn default_names_follow_category() {
        let mut watcher = Z80Watcher::new();
        assert_eq!(
            watcher.before_reading_port().unwrap().display_name(),
            "BeforePortRead"
        );
        assert_eq!(
            watcher.after_writing_memory().unwrap().display_name(),
            "AfterMemoryWrite"
        );
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut watcher = Z80Watcher::new();
        let _ = watcher.before_fetching_instruction().unwrap();
        watcher.dispose();
        watcher.dispose();
        assert!(watcher.is_disposed());
        assert!(!watcher.is_attached(EventFeed::BeforeFetch));
        assert!(matches!(watcher.watch_count(), Err(Error::Disposed)));
    }
}
