//! Weakly keyed cache of locally held proxies.
//!
//! Coalesces repeated decodes of the same remote Name onto one live
//! [`Proxy`] and backs the Release flow: the table never keeps a proxy
//! alive, and a proxy's `Drop` enqueues its name for the finalizer task.
//!
//! The finalize/redecode race is tolerated by construction: a dead entry is
//! simply replaced, and the stale finalizer still sends its (possibly
//! premature) Release, which the peer ignores for unknown or Explicit
//! names.

use std::collections::HashMap;
use std::sync::Weak;

use crate::core::value::Name;
use crate::protocol::connection::Connection;
use crate::protocol::proxy::{Proxy, ProxyShared};

/// Per-connection Name-to-proxy cache.
#[derive(Default)]
pub(crate) struct ProxyTable {
    entries: HashMap<Name, Weak<ProxyShared>>,
}

impl ProxyTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The live proxy for `name`, creating and caching one if needed.
    pub(crate) fn get_or_create(&mut self, name: &Name, conn: &Connection) -> Proxy {
        if let Some(shared) = self.entries.get(name).and_then(Weak::upgrade) {
            return Proxy::from_shared(shared);
        }
        let proxy = Proxy::new(conn.clone(), name.clone());
        self.entries
            .insert(name.clone(), std::sync::Arc::downgrade(proxy.shared()));
        proxy
    }

    /// Drop the entry for `name` if its proxy is gone; called by the
    /// finalizer when processing that name's Release.
    pub(crate) fn remove_dead(&mut self, name: &Name) {
        if let Some(weak) = self.entries.get(name) {
            if weak.upgrade().is_none() {
                self.entries.remove(name);
            }
        }
    }

    /// Number of live entries (dead ones included until swept).
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Forget every entry; queued releases are dropped by the caller.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionOptions;
    use std::sync::Arc;

    #[tokio::test]
    async fn coalesces_live_proxies_and_replaces_dead_entries() {
        let (io, _peer) = tokio::io::duplex(1024);
        let conn = Connection::new(io, ConnectionOptions::client());
        let mut table = ProxyTable::new();
        let name = Name::from("svc");

        let first = table.get_or_create(&name, &conn);
        let second = table.get_or_create(&name, &conn);
        assert!(Arc::ptr_eq(first.shared(), second.shared()));
        assert_eq!(table.len(), 1);

        drop(first);
        drop(second);

        // The entry is dead now; a redecode installs a fresh proxy.
        let third = table.get_or_create(&name, &conn);
        assert_eq!(third.name(), &name);
        assert_eq!(table.len(), 1);

        // remove_dead leaves live entries alone and sweeps dead ones.
        table.remove_dead(&name);
        assert_eq!(table.len(), 1);
        drop(third);
        table.remove_dead(&name);
        assert_eq!(table.len(), 0);
    }
}
