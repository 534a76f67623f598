//! Per-connection object registry.
//!
//! Maps [`Name`]s to bound objects. Explicit bindings live until the
//! connection terminates; implicit bindings live while the peer holds a
//! proxy and are removed by `Release`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::value::{Name, ObjectRef};

/// Lifetime kind of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Bound by the application; immune to `Release`.
    Explicit,
    /// Bound by the engine while encoding a reference; removed on `Release`.
    Implicit,
}

struct Binding {
    object: ObjectRef,
    kind: BindingKind,
}

/// Name-to-binding map for one side of a connection.
#[derive(Default)]
pub struct ObjectRegistry {
    bindings: HashMap<Name, Binding>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `object` under `name` with connection lifetime.
    ///
    /// Rebinding an existing name is last-write-wins and the binding stays
    /// Explicit.
    pub fn bind_explicit(&mut self, name: Name, object: ObjectRef) {
        debug!(name = %name, kind = object.kind(), "binding object");
        self.bindings.insert(
            name,
            Binding {
                object,
                kind: BindingKind::Explicit,
            },
        );
    }

    /// Bind `object` implicitly, returning its Name.
    ///
    /// The Name derives from the object's identity, so repeated binds of
    /// the same object return the same Name while the binding lives. An
    /// existing binding under that Name (of either kind) is left as-is.
    pub fn bind_implicit(&mut self, object: ObjectRef) -> Name {
        let name = implicit_name(&object);
        self.bindings.entry(name.clone()).or_insert_with(|| {
            trace!(name = %name, kind = object.kind(), "implicit binding");
            Binding {
                object,
                kind: BindingKind::Implicit,
            }
        });
        name
    }

    /// The object bound under `name`, if any.
    pub fn lookup(&self, name: &Name) -> Option<ObjectRef> {
        self.bindings.get(name).map(|b| b.object.clone())
    }

    /// The binding kind under `name`, if any.
    pub fn kind(&self, name: &Name) -> Option<BindingKind> {
        self.bindings.get(name).map(|b| b.kind)
    }

    /// Remove an Implicit binding; unknown or Explicit names are a no-op.
    pub fn release(&mut self, name: &Name) {
        match self.kind(name) {
            Some(BindingKind::Implicit) => {
                trace!(name = %name, "releasing implicit binding");
                self.bindings.remove(name);
            }
            Some(BindingKind::Explicit) => {
                trace!(name = %name, "ignoring release of explicit binding")
            }
            None => trace!(name = %name, "ignoring release of unknown name"),
        }
    }

    /// Whether `name` is currently bound.
    pub fn contains(&self, name: &Name) -> bool {
        self.bindings.contains_key(name)
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True when no bindings exist.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop all bindings.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

/// Identity-derived implicit name: stable while the binding holds the
/// object alive, unique per connection for that lifetime.
fn implicit_name(object: &ObjectRef) -> Name {
    let addr = Arc::as_ptr(object) as *const () as usize;
    Name::new(format!("obj-{addr:x}"))
}
