//! Registered watches.

use std::fmt;

use crate::context::{Category, EventContext};
use crate::expectation::Reach;

/// Decides whether a watch matches an occurrence.
pub type Predicate<D> = Box<dyn FnMut(&EventContext<'_, D>) -> anyhow::Result<bool>>;

/// Runs when a watch matches; may change the context.
pub type Callback<D> = Box<dyn FnMut(&mut EventContext<'_, D>) -> anyhow::Result<()>>;

/// Identifies a registered watch for later queries.
///
/// Ids are invalidated by `remove_all_watches`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId {
    pub(crate) category: Category,
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl WatchId {
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.category, self.index)
    }
}

pub(crate) struct Watch<D> {
    pub predicate: Predicate<D>,
    pub callbacks: Vec<Callback<D>>,
    pub reach: Reach,
}

impl<D> Watch<D> {
    pub fn new(category: Category, predicate: Predicate<D>) -> Self {
        Self {
            predicate,
            callbacks: Vec::new(),
            reach: Reach::new(category.default_name()),
        }
    }
}

impl<D> fmt::Debug for Watch<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("reach", &self.reach)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}
