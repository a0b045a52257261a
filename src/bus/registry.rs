// ABOUTME: Named registry tree addressed by dotted paths ("at.command.build")
// ABOUTME: Nodes own their entries; removing an entry tears down nested nodes and services

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::bus::error::{BusError, BusResult};
use crate::bus::traits::Service;

/// A value stored under a name.
#[derive(Clone)]
pub enum Entry {
    /// A nested registry node.
    Node(Arc<Registry>),
    /// An object whose `unregister` runs when the entry is removed.
    Service(Arc<dyn Service>),
    /// Any shared value: a function pointer, a codec, a factory.
    Value(Arc<dyn Any + Send + Sync>),
}

impl Entry {
    pub fn as_node(&self) -> Option<&Arc<Registry>> {
        match self {
            Entry::Node(node) => Some(node),
            _ => None,
        }
    }

    fn teardown(self) {
        match self {
            Entry::Node(node) => node.unregister_all(),
            Entry::Service(service) => service.unregister(),
            Entry::Value(_) => {}
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Node(node) => f.debug_tuple("Node").field(&node.names()).finish(),
            Entry::Service(_) => f.write_str("Service"),
            Entry::Value(_) => f.write_str("Value"),
        }
    }
}

/// One node of the registry tree.
///
/// Names are unique within a node and kept in registration order, which is
/// also the teardown order of [`Registry::unregister_all`].
#[derive(Default)]
pub struct Registry {
    entries: RwLock<Vec<(String, Entry)>>,
    // Names registered while a module is being applied
    tracking: Mutex<Option<Vec<String>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` under `name`, failing if the name is taken.
    pub fn register(&self, name: &str, entry: Entry) -> BusResult<Entry> {
        {
            let mut entries = self.entries.write();
            if entries.iter().any(|(existing, _)| existing == name) {
                return Err(BusError::NameConflict(name.to_string()));
            }
            entries.push((name.to_string(), entry.clone()));
        }

        if let Some(names) = self.tracking.lock().as_mut() {
            names.push(name.to_string());
        }

        Ok(entry)
    }

    /// Create an empty child node under `name`.
    pub fn register_node(&self, name: &str) -> BusResult<Arc<Registry>> {
        let node = Arc::new(Registry::new());
        self.register(name, Entry::Node(Arc::clone(&node)))?;
        Ok(node)
    }

    pub fn register_value<T: Any + Send + Sync>(&self, name: &str, value: T) -> BusResult<Arc<T>> {
        let value = Arc::new(value);
        self.register(name, Entry::Value(value.clone()))?;
        Ok(value)
    }

    pub fn register_service<S: Service + 'static>(
        &self,
        name: &str,
        service: Arc<S>,
    ) -> BusResult<Arc<S>> {
        self.register(name, Entry::Service(service.clone()))?;
        Ok(service)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().iter().any(|(existing, _)| existing == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn child(&self, name: &str) -> Option<Entry> {
        self.entries
            .read()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, entry)| entry.clone())
    }

    /// Resolve a dotted path relative to this node.
    pub fn get(&self, path: &str) -> BusResult<Entry> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut entry = self
            .child(first)
            .ok_or_else(|| BusError::lookup(path, "no such name"))?;

        for segment in segments {
            let node = entry
                .as_node()
                .ok_or_else(|| BusError::lookup(path, "intermediate segment is not a node"))?;
            entry = node
                .child(segment)
                .ok_or_else(|| BusError::lookup(path, "no such name"))?;
        }

        Ok(entry)
    }

    pub fn get_node(&self, path: &str) -> BusResult<Arc<Registry>> {
        match self.get(path)? {
            Entry::Node(node) => Ok(node),
            _ => Err(BusError::lookup(path, "entry is not a node")),
        }
    }

    /// Resolve `path` and downcast the stored value to `T`.
    pub fn get_value<T: Any + Send + Sync>(&self, path: &str) -> BusResult<Arc<T>> {
        match self.get(path)? {
            Entry::Value(value) => value
                .downcast::<T>()
                .map_err(|_| BusError::lookup(path, "value has a different type")),
            _ => Err(BusError::lookup(path, "entry is not a value")),
        }
    }

    /// Remove `name` and tear it down.
    pub fn unregister(&self, name: &str) -> BusResult<()> {
        let entry = {
            let mut entries = self.entries.write();
            let position = entries
                .iter()
                .position(|(existing, _)| existing == name)
                .ok_or_else(|| BusError::lookup(name, "nothing registered to unregister"))?;
            entries.remove(position).1
        };
        // Lock released first: services may call back into the registry
        entry.teardown();
        Ok(())
    }

    /// Remove and tear down every entry of this node.
    pub fn unregister_all(&self) {
        let entries = std::mem::take(&mut *self.entries.write());
        for (_, entry) in entries {
            entry.teardown();
        }
    }

    /// Replace `name` with `entry`, tearing down any previous occupant.
    pub fn reload(&self, name: &str, entry: Entry) -> BusResult<Entry> {
        if self.contains(name) {
            self.unregister(name)?;
        }
        self.register(name, entry)
    }

    pub(crate) fn start_tracking(&self) {
        *self.tracking.lock() = Some(Vec::new());
    }

    pub(crate) fn finish_tracking(&self) -> Vec<String> {
        self.tracking.lock().take().unwrap_or_default()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingService {
        teardowns: AtomicUsize,
    }

    impl Service for CountingService {
        fn unregister(&self) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn duplicate_name_conflicts() {
        let registry = Registry::new();
        registry.register_value("pdu", 1u32).unwrap();
        let err = registry.register_value("pdu", 2u32).unwrap_err();
        assert!(matches!(err, BusError::NameConflict(name) if name == "pdu"));
    }

    #[test]
    fn same_name_in_different_nodes() {
        let registry = Registry::new();
        let child = registry.register_node("at").unwrap();
        child.register_value("at", 1u8).unwrap();
        assert!(registry.get("at.at").is_ok());
    }

    #[test]
    fn dotted_lookup() {
        let registry = Registry::new();
        let at = registry.register_node("at").unwrap();
        let command = at.register_node("command").unwrap();
        command.register_value("build", "builder").unwrap();

        let value = registry.get_value::<&str>("at.command.build").unwrap();
        assert_eq!(*value, "builder");
        assert!(registry.get_node("at.command").is_ok());
    }

    #[test]
    fn lookup_failures() {
        let registry = Registry::new();
        registry.register_value("leaf", 5i32).unwrap();

        assert!(matches!(registry.get("missing"), Err(BusError::Lookup { .. })));
        assert!(matches!(registry.get("leaf.child"), Err(BusError::Lookup { .. })));
        assert!(matches!(registry.get_value::<String>("leaf"), Err(BusError::Lookup { .. })));
        assert!(matches!(registry.get_node("leaf"), Err(BusError::Lookup { .. })));
    }

    #[test]
    fn unregister_unknown_name() {
        let registry = Registry::new();
        assert!(matches!(registry.unregister("nope"), Err(BusError::Lookup { .. })));
    }

    #[test]
    fn unregister_tears_down_nested_services() {
        let registry = Registry::new();
        let service = Arc::new(CountingService::default());
        let node = registry.register_node("serial").unwrap();
        node.register_service("COM3", service.clone()).unwrap();

        registry.unregister("serial").unwrap();

        assert_eq!(service.teardowns.load(Ordering::SeqCst), 1);
        assert!(node.is_empty());
        assert!(!registry.contains("serial"));
    }

    #[test]
    fn unregister_all_clears_node() {
        let registry = Registry::new();
        let service = Arc::new(CountingService::default());
        registry.register_service("a", service.clone()).unwrap();
        registry.register_value("b", ()).unwrap();

        registry.unregister_all();

        assert!(registry.is_empty());
        assert_eq!(service.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reload_replaces_entry() {
        let registry = Registry::new();
        let old = Arc::new(CountingService::default());
        registry.register_service("svc", old.clone()).unwrap();

        registry.reload("svc", Entry::Value(Arc::new(7u8))).unwrap();

        assert_eq!(old.teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(*registry.get_value::<u8>("svc").unwrap(), 7);
    }

    #[test]
    fn tracking_records_names_in_order() {
        let registry = Registry::new();
        registry.register_value("before", ()).unwrap();
        registry.start_tracking();
        registry.register_value("x", ()).unwrap();
        registry.register_node("y").unwrap();
        assert_eq!(registry.finish_tracking(), vec!["x".to_string(), "y".to_string()]);
        assert!(registry.finish_tracking().is_empty());
    }
}
