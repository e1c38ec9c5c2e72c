//! Concurrent, referential-integrity-preserving package dependency index.
//!
//! A package is *indexed* iff it is a key in the store. `index`/`remove`
//! maintain two invariants as a unit:
//!
//! - I1: every dependency named in `deps` is itself indexed.
//! - I3: `P` is in `Q.dependents` iff `Q` is in `P.deps`.
//!
//! Both operations take the store's single `RwLock` in write mode for their
//! entire read-modify-write; `query` takes it in read mode. The lock hold
//! time is exactly the linearization unit — no caller ever observes a state
//! where `deps` and `dependents` disagree.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::trace;
use tokio::sync::RwLock;

/// One dependency graph node. Only reachable through the store; no
/// reference to a `Package` ever escapes it.
#[derive(Debug, Default, Clone)]
struct Package {
    deps: HashSet<String>,
    dependents: HashSet<String>,
}

/// Result of a mutating or read-only store operation.
///
/// `Fail` is a normal, expected outcome under the referential-integrity
/// rules (§4.1) — it is not a Rust-level error, so this is a plain enum
/// rather than a `Result`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IndexOutcome {
    Ok,
    Fail,
}

impl IndexOutcome {
    pub fn is_ok(self) -> bool {
        matches!(self, IndexOutcome::Ok)
    }
}

#[derive(Default)]
struct Inner {
    packages: HashMap<String, Package>,
}

impl Inner {
    /// Debug-only check of I1–I3. A violation means the data model is
    /// corrupt and correctness has already been lost; abort rather than
    /// silently serve wrong answers.
    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        for (name, pkg) in &self.packages {
            for dep in &pkg.deps {
                let dep_pkg = self
                    .packages
                    .get(dep)
                    .unwrap_or_else(|| panic!("I1 violated: {name} depends on unindexed {dep}"));
                if !dep_pkg.dependents.contains(name) {
                    panic!("I3 violated: {dep} is a dep of {name} but {name} not in its dependents");
                }
            }
            for dependent in &pkg.dependents {
                let dependent_pkg = self.packages.get(dependent).unwrap_or_else(|| {
                    panic!("I2 violated: {dependent} depends on {name} but is not indexed")
                });
                if !dependent_pkg.deps.contains(name) {
                    panic!("I3 violated: {name} lists {dependent} as a dependent but not vice versa");
                }
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self) {}
}

/// The shared, cloneable handle to the dependency index.
///
/// Cloning an `IndexStore` clones the `Arc`; every clone operates on the
/// same underlying map.
#[derive(Clone)]
pub struct IndexStore {
    inner: Arc<RwLock<Inner>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// §4.1 `index(name, deps)`.
    pub async fn index(&self, name: &str, deps: &[String]) -> IndexOutcome {
        let mut inner = self.inner.write().await;

        let new_deps: HashSet<String> = deps.iter().cloned().collect();
        for dep in &new_deps {
            if !inner.packages.contains_key(dep) {
                trace!("index {name}: FAIL, missing dep {dep}");
                return IndexOutcome::Fail;
            }
        }

        let old_deps = inner
            .packages
            .get(name)
            .map(|p| p.deps.clone())
            .unwrap_or_default();

        for removed in old_deps.difference(&new_deps) {
            if let Some(p) = inner.packages.get_mut(removed) {
                p.dependents.remove(name);
            }
        }
        for added in new_deps.difference(&old_deps) {
            // `added` is guaranteed indexed by the check above, except when
            // `added == name` and this is the first-time index of `name` —
            // but that case already returned FAIL, since `name` itself was
            // not yet a key. So on a successful re-index, `added` (if it is
            // `name`) refers to the entry we are about to update below.
            if added == name {
                continue;
            }
            inner
                .packages
                .get_mut(added)
                .expect("dep existence checked above")
                .dependents
                .insert(name.to_string());
        }

        let entry = inner.packages.entry(name.to_string()).or_default();
        entry.deps = new_deps.clone();
        if new_deps.contains(name) {
            entry.dependents.insert(name.to_string());
        }

        inner.check_invariants();
        trace!("index {name}: OK, {} deps", new_deps.len());
        IndexOutcome::Ok
    }

    /// §4.1 `remove(name)`.
    pub async fn remove(&self, name: &str) -> IndexOutcome {
        let mut inner = self.inner.write().await;

        let Some(pkg) = inner.packages.get(name) else {
            trace!("remove {name}: OK (not indexed, idempotent)");
            return IndexOutcome::Ok;
        };

        if !pkg.dependents.is_empty() {
            trace!("remove {name}: FAIL, {} dependents", pkg.dependents.len());
            return IndexOutcome::Fail;
        }

        let deps = pkg.deps.clone();
        for dep in &deps {
            if dep == name {
                continue;
            }
            if let Some(p) = inner.packages.get_mut(dep) {
                p.dependents.remove(name);
            }
        }
        inner.packages.remove(name);

        inner.check_invariants();
        trace!("remove {name}: OK");
        IndexOutcome::Ok
    }

    /// §4.1 `query(name)`. Read-only; never blocks a writer longer than it
    /// takes to check membership.
    pub async fn query(&self, name: &str) -> IndexOutcome {
        let inner = self.inner.read().await;
        if inner.packages.contains_key(name) {
            IndexOutcome::Ok
        } else {
            IndexOutcome::Fail
        }
    }

    /// Number of currently indexed packages. Used by the diagnostics
    /// heartbeat; not part of the wire protocol.
    pub async fn package_count(&self) -> usize {
        self.inner.read().await.packages.len()
    }
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new()
    }
}
