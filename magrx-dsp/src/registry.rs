//! Per-operation kernel registries with select-on-first-call dispatch.

use parking_lot::{
    Mutex,
    RwLock,
};

/// One selectable implementation of an operation.
pub(crate) struct KernelEntry<F> {
    pub rank: usize,
    pub name: &'static str,
    pub flavor: &'static str,
    pub callable: F,
    /// `None` means "always usable"; otherwise the entry is skipped unless
    /// the probe returns true.
    pub supported: Option<fn() -> bool>,
}

impl<F> KernelEntry<F> {
    pub fn new(name: &'static str, flavor: &'static str, callable: F) -> Self {
        Self {
            rank: 0,
            name,
            flavor,
            callable,
            supported: None,
        }
    }

    pub fn gated(
        name: &'static str,
        flavor: &'static str,
        callable: F,
        supported: fn() -> bool,
    ) -> Self {
        Self {
            supported: Some(supported),
            ..Self::new(name, flavor, callable)
        }
    }
}

#[derive(Clone, Copy)]
struct Selected<F> {
    callable: F,
    name: &'static str,
}

/// A dispatch handle for one operation.
///
/// The first call walks the ranked registry and caches the first entry
/// whose capability probe passes; later calls return the cached function
/// without touching the registry. Concurrent first calls race benignly:
/// both walk the same ordered list and store the same winner.
pub struct Kernel<F: Copy> {
    op: &'static str,
    entries: Mutex<Vec<KernelEntry<F>>>,
    selected: RwLock<Option<Selected<F>>>,
}

impl<F: Copy> Kernel<F> {
    pub(crate) fn new(op: &'static str, mut entries: Vec<KernelEntry<F>>) -> Self {
        for (rank, entry) in entries.iter_mut().enumerate() {
            entry.rank = rank;
        }
        Self {
            op,
            entries: Mutex::new(entries),
            selected: RwLock::new(None),
        }
    }

    pub fn op_name(&self) -> &'static str {
        self.op
    }

    /// Resolve the handle, selecting an implementation if none is cached.
    ///
    /// Panics if no compiled-in implementation is usable on this CPU; that
    /// can only happen on a misconfigured build.
    pub fn get(&self) -> F {
        if let Some(selected) = *self.selected.read() {
            return selected.callable;
        }
        self.select()
    }

    fn select(&self) -> F {
        let entries = self.entries.lock();
        for entry in entries.iter() {
            if entry.supported.is_none_or(|probe| probe()) {
                tracing::debug!(
                    op = self.op,
                    implementation = entry.name,
                    flavor = entry.flavor,
                    "selected kernel"
                );
                *self.selected.write() = Some(Selected {
                    callable: entry.callable,
                    name: entry.name,
                });
                return entry.callable;
            }
        }
        panic!("no supported implementation for {}", self.op);
    }

    /// Name of the implementation the handle resolved to, if any call
    /// happened since construction or the last wisdom reload.
    pub fn selected_name(&self) -> Option<&'static str> {
        self.selected.read().map(|selected| selected.name)
    }

    /// Registry order as it stands, best-ranked first.
    pub fn implementation_names(&self) -> Vec<&'static str> {
        self.entries.lock().iter().map(|entry| entry.name).collect()
    }

    /// Re-rank the registry from a preference list.
    ///
    /// Implementations named in `preferred` move to the front in list
    /// order; everything else keeps its relative order behind them. The
    /// cached selection is dropped so the next call re-selects.
    pub fn apply_wisdom(&self, preferred: &[&str]) {
        let mut entries = self.entries.lock();
        for (index, entry) in entries.iter_mut().enumerate() {
            match preferred.iter().position(|name| *name == entry.name) {
                Some(position) => entry.rank = position,
                None => entry.rank = preferred.len() + index,
            }
        }
        entries.sort_by_key(|entry| entry.rank);
        *self.selected.write() = None;
    }
}

/// Signature-erased view of a [`Kernel`], used where registries of
/// different operations are handled uniformly (wisdom files, listings).
pub trait KernelHandle {
    fn op_name(&self) -> &'static str;
    fn selected_name(&self) -> Option<&'static str>;
    fn implementation_names(&self) -> Vec<&'static str>;
    fn apply_wisdom(&self, preferred: &[&str]);
}

impl<F: Copy> KernelHandle for Kernel<F> {
    fn op_name(&self) -> &'static str {
        Kernel::op_name(self)
    }

    fn selected_name(&self) -> Option<&'static str> {
        Kernel::selected_name(self)
    }

    fn implementation_names(&self) -> Vec<&'static str> {
        Kernel::implementation_names(self)
    }

    fn apply_wisdom(&self, preferred: &[&str]) {
        Kernel::apply_wisdom(self, preferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestFn = fn() -> u32;

    fn one() -> u32 {
        1
    }

    fn two() -> u32 {
        2
    }

    fn never() -> bool {
        false
    }

    fn kernel() -> Kernel<TestFn> {
        Kernel::new(
            "test_op",
            vec![
                KernelEntry::gated("gated", "x86_avx2", one as TestFn, never),
                KernelEntry::new("first", "generic", one as TestFn),
                KernelEntry::new("second", "generic", two as TestFn),
            ],
        )
    }

    #[test]
    fn selects_first_supported_entry() {
        let kernel = kernel();
        assert_eq!(kernel.selected_name(), None);
        assert_eq!((kernel.get())(), 1);
        assert_eq!(kernel.selected_name(), Some("first"));
    }

    #[test]
    fn wisdom_reorders_and_resets_selection() {
        let kernel = kernel();
        let _ = kernel.get();

        kernel.apply_wisdom(&["second"]);
        assert_eq!(kernel.selected_name(), None);
        assert_eq!((kernel.get())(), 2);
        assert_eq!(kernel.selected_name(), Some("second"));
        assert_eq!(kernel.implementation_names(), vec!["second", "gated", "first"]);
    }

    #[test]
    fn unmatched_names_keep_relative_order() {
        let kernel = kernel();
        kernel.apply_wisdom(&["no_such_impl"]);
        assert_eq!(kernel.implementation_names(), vec!["gated", "first", "second"]);
    }
}
