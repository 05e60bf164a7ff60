//! Registry of live connections and their display names.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ConnId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Connection {0} is already registered")]
    AlreadyRegistered(ConnId),
}

/// Every live connection mapped to its display name (empty until the client sends one).
///
/// Connection ids are handed out in increasing order, so iterating the map yields
/// connections in the order they were registered. The pairing scan relies on that.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<ConnId, String>,
}

impl ClientRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
        }
    }

    /// # Errors
    ///
    /// * If `conn` is already registered. The existing entry is left untouched.
    pub fn register(&mut self, conn: ConnId) -> Result<(), RegistryError> {
        if self.clients.contains_key(&conn) {
            return Err(RegistryError::AlreadyRegistered(conn));
        }

        self.clients.insert(conn, String::new());

        Ok(())
    }

    /// Removes `conn`, returning its display name if it was registered.
    pub fn unregister(&mut self, conn: ConnId) -> Option<String> {
        self.clients.remove(&conn)
    }

    /// Returns `false` if `conn` is not registered.
    pub fn set_name(&mut self, conn: ConnId, name: impl Into<String>) -> bool {
        self.clients.get_mut(&conn).is_some_and(|existing| {
            *existing = name.into();
            true
        })
    }

    #[must_use]
    pub fn name(&self, conn: ConnId) -> Option<&str> {
        self.clients.get(&conn).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, conn: ConnId) -> bool {
        self.clients.contains_key(&conn)
    }

    /// Sorted snapshot of every non-empty display name.
    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        let mut names = self
            .clients
            .values()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect::<Vec<_>>();

        names.sort();
        names
    }

    /// Registered connections in registration order.
    pub fn connections(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.clients.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn register_adds_connection_with_empty_name() {
        let mut registry = ClientRegistry::new();

        registry.register(1).unwrap();

        assert!(registry.contains(1));
        assert_eq!(registry.name(1), Some(""));
        assert_eq!(registry.len(), 1);
    }

    #[test_log::test]
    fn register_twice_is_rejected_and_keeps_name() {
        let mut registry = ClientRegistry::new();
        registry.register(1).unwrap();
        registry.set_name(1, "alice");

        assert_eq!(
            registry.register(1),
            Err(RegistryError::AlreadyRegistered(1))
        );
        assert_eq!(registry.name(1), Some("alice"));
    }

    #[test_log::test]
    fn unregister_returns_name_once() {
        let mut registry = ClientRegistry::new();
        registry.register(7).unwrap();
        registry.set_name(7, "bob");

        assert_eq!(registry.unregister(7), Some("bob".to_string()));
        assert_eq!(registry.unregister(7), None);
        assert!(registry.is_empty());
    }

    #[test_log::test]
    fn set_name_ignores_unknown_connection() {
        let mut registry = ClientRegistry::new();

        assert!(!registry.set_name(3, "carol"));
        assert!(registry.is_empty());
    }

    #[test_log::test]
    fn list_names_is_sorted_and_skips_empty_names() {
        let mut registry = ClientRegistry::new();
        for conn in 1..=4 {
            registry.register(conn).unwrap();
        }
        registry.set_name(1, "mallory");
        registry.set_name(2, "alice");
        registry.set_name(4, "bob");

        assert_eq!(registry.list_names(), vec!["alice", "bob", "mallory"]);
    }

    #[test_log::test]
    fn connections_iterate_in_registration_order() {
        let mut registry = ClientRegistry::new();
        for conn in [3, 9, 12] {
            registry.register(conn).unwrap();
        }
        registry.unregister(9);
        registry.register(15).unwrap();

        assert_eq!(registry.connections().collect::<Vec<_>>(), vec![3, 12, 15]);
    }
}
