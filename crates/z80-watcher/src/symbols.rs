//! Name to address table shared with every context.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Symbol table mapping names to 16-bit addresses.
///
/// Lookups of names that were never defined fail with
/// [`Error::MissingSymbol`]; there is no default address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Symbols {
    entries: HashMap<String, u16>,
}

impl Symbols {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of `name`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingSymbol`] if `name` is not defined.
    pub fn get(&self, name: &str) -> Result<u16> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| Error::MissingSymbol(name.to_owned()))
    }

    /// Define or redefine `name`, returning the previous address.
    pub fn insert(&mut self, name: impl Into<String>, address: u16) -> Option<u16> {
        self.entries.insert(name.into(), address)
    }

    pub fn remove(&mut self, name: &str) -> Option<u16> {
        self.entries.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.entries.iter().map(|(name, &address)| (name.as_str(), address))
    }
}

impl<S: Into<String>> FromIterator<(S, u16)> for Symbols {
    fn from_iter<I: IntoIterator<Item = (S, u16)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(name, address)| (name.into(), address)).collect(),
        }
    }
}

impl<S: Into<String>> Extend<(S, u16)> for Symbols {
    fn extend<I: IntoIterator<Item = (S, u16)>>(&mut self, iter: I) {
        self.entries
            .extend(iter.into_iter().map(|(name, address)| (name.into(), address)));
    }
}

/// Where a watch triggers: a fixed address or a symbol.
///
/// Symbols resolve every time the watch is matched, so they may be defined
/// after the watch is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Absolute(u16),
    Symbol(String),
}

impl Location {
    /// The address this location currently stands for.
    ///
    /// # Errors
    ///
    /// [`Error::MissingSymbol`] if a symbolic location is not defined.
    pub fn resolve(&self, symbols: &Symbols) -> Result<u16> {
        match self {
            Location::Absolute(address) => Ok(*address),
            Location::Symbol(name) => symbols.get(name),
        }
    }
}

impl From<u16> for Location {
    fn from(address: u16) -> Self {
        Location::Absolute(address)
    }
}

impl From<&str> for Location {
    fn from(name: &str) -> Self {
        Location::Symbol(name.to_owned())
    }
}

impl From<String> for Location {
    fn from(name: String) -> Self {
        Location::Symbol(name)
    }
}
