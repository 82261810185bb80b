//! Ordered, groupable execution of callables.
//!
//! An [`Invoker`] holds named groups, each an ordered list of entries. An
//! entry is either a callable or a nested `Invoker`, which lets a whole
//! batch of callables be registered and removed as one unit (e.g. all
//! cleanup callbacks contributed while processing one item). Invocation
//! within a group is strict insertion order; which groups run, and when, is
//! entirely the caller's decision.

use std::collections::{BTreeMap, HashMap};

use pb_core::Result;

/// A callable registered with an [`Invoker`].
pub type Callable<C> = Box<dyn FnMut(&mut C) -> Result<()>>;

/// Identifier of one registered entry, unique within its invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

enum Entry<C> {
    Callable(Callable<C>),
    Nested(Invoker<C>),
}

/// Ordered command-list executor with named groups and nested sub-invokers.
pub struct Invoker<C> {
    groups: BTreeMap<String, Vec<EntryId>>,
    entries: HashMap<EntryId, Entry<C>>,
    next_id: u64,
}

impl<C> Default for Invoker<C> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            entries: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<C> Invoker<C> {
    /// Create an empty invoker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callable to the end of each named group.
    pub fn add(&mut self, groups: &[&str], callable: Callable<C>) -> EntryId {
        self.add_at(groups, None, callable)
    }

    /// Insert a callable at `position` within each named group.
    ///
    /// `None` appends; a negative position counts from the end (`-1` inserts
    /// just before the last entry). Groups are created on demand.
    pub fn add_at(
        &mut self,
        groups: &[&str],
        position: Option<isize>,
        callable: Callable<C>,
    ) -> EntryId {
        self.insert_entry(groups, position, Entry::Callable(callable))
    }

    /// Register a whole sub-invoker as a single entry of each named group.
    ///
    /// When the group is invoked, the sub-invoker's same-named group runs in
    /// its place; removing the entry removes all of its nested callables
    /// atomically.
    pub fn add_invoker(&mut self, groups: &[&str], invoker: Invoker<C>) -> EntryId {
        self.insert_entry(groups, None, Entry::Nested(invoker))
    }

    fn insert_entry(
        &mut self,
        groups: &[&str],
        position: Option<isize>,
        entry: Entry<C>,
    ) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, entry);

        for group in groups {
            let ids = self.groups.entry((*group).to_string()).or_default();
            let index = match position {
                None => ids.len(),
                Some(position) if position < 0 => {
                    ids.len().saturating_sub(position.unsigned_abs())
                }
                Some(position) => (position as usize).min(ids.len()),
            };
            ids.insert(index, id);
        }

        id
    }

    /// Remove an entry from all groups. Returns `false` if the id is
    /// unknown.
    pub fn remove(&mut self, id: EntryId) -> bool {
        if self.entries.remove(&id).is_none() {
            return false;
        }
        for ids in self.groups.values_mut() {
            ids.retain(|&entry| entry != id);
        }
        true
    }

    /// Move an entry to `position` within one group.
    ///
    /// A negative position counts from the end after removal (`-1` moves the
    /// entry to the last position).
    pub fn reorder(&mut self, group: &str, id: EntryId, position: isize) -> Result<()> {
        let ids = self.groups.get_mut(group).ok_or_else(|| {
            pb_core::Error::Validation(format!("no such group: \"{group}\""))
        })?;
        let current = ids.iter().position(|&entry| entry == id).ok_or_else(|| {
            pb_core::Error::Validation(format!("entry not registered in group \"{group}\""))
        })?;
        ids.remove(current);

        let index = if position < 0 {
            (ids.len() + 1).saturating_sub(position.unsigned_abs())
        } else {
            (position as usize).min(ids.len())
        };
        ids.insert(index, id);
        Ok(())
    }

    /// Run one group's entries in order, stopping at the first error.
    ///
    /// Unknown groups are a no-op. Nested invokers run their same-named
    /// group in place.
    pub fn invoke(&mut self, group: &str, ctx: &mut C) -> Result<()> {
        let ids = match self.groups.get(group) {
            Some(ids) => ids.clone(),
            None => return Ok(()),
        };

        for id in ids {
            match self.entries.get_mut(&id) {
                Some(Entry::Callable(callable)) => callable(ctx)?,
                Some(Entry::Nested(nested)) => nested.invoke(group, ctx)?,
                None => {}
            }
        }

        Ok(())
    }

    /// Mutable access to a nested invoker entry.
    pub fn nested_mut(&mut self, id: EntryId) -> Option<&mut Invoker<C>> {
        match self.entries.get_mut(&id) {
            Some(Entry::Nested(nested)) => Some(nested),
            _ => None,
        }
    }

    /// Entry ids of one group, in invocation order.
    pub fn entry_ids(&self, group: &str) -> Vec<EntryId> {
        self.groups.get(group).cloned().unwrap_or_default()
    }

    /// Names of all known groups.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    /// Number of callables one group would run, counting through nested
    /// invokers.
    pub fn flattened_count(&self, group: &str) -> usize {
        let ids = match self.groups.get(group) {
            Some(ids) => ids,
            None => return 0,
        };
        ids.iter()
            .map(|id| match self.entries.get(id) {
                Some(Entry::Callable(_)) => 1,
                Some(Entry::Nested(nested)) => nested.flattened_count(group),
                None => 0,
            })
            .sum()
    }

    /// Whether an entry id is still registered.
    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }
}
