// ABOUTME: Root context owning the registry tree, the event bus and loaded modules
// ABOUTME: Modules are applied with root-name tracking so they can be rolled back or reloaded

use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bus::binding::EventParam;
use crate::bus::dispatch::{EventBus, HandlerId};
use crate::bus::error::{BusError, BusResult};
use crate::bus::registry::{Entry, Registry};
use crate::bus::traits::{EventHandler, Module, Service};
use crate::event::Event;

struct ModuleRecord {
    module: Arc<dyn Module>,
    // Root names registered by the last apply
    names: Vec<String>,
}

/// Shared root of a running system.
///
/// Registry operations address the root node; nested nodes are reached
/// through the returned [`Registry`] handles or dotted paths.
pub struct Context {
    root: Arc<Registry>,
    bus: EventBus,
    modules: Mutex<Vec<ModuleRecord>>,
}

impl Context {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            root: Arc::new(Registry::new()),
            bus: EventBus::new(),
            modules: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Arc<Registry> {
        &self.root
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn register(&self, name: &str, entry: Entry) -> BusResult<Entry> {
        self.root.register(name, entry)
    }

    pub fn register_node(&self, name: &str) -> BusResult<Arc<Registry>> {
        self.root.register_node(name)
    }

    pub fn register_value<T: Any + Send + Sync>(&self, name: &str, value: T) -> BusResult<Arc<T>> {
        self.root.register_value(name, value)
    }

    pub fn register_service<S: Service + 'static>(&self, name: &str, service: Arc<S>) -> BusResult<Arc<S>> {
        self.root.register_service(name, service)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.root.contains(name)
    }

    pub fn get(&self, path: &str) -> BusResult<Entry> {
        self.root.get(path)
    }

    pub fn get_node(&self, path: &str) -> BusResult<Arc<Registry>> {
        self.root.get_node(path)
    }

    pub fn get_value<T: Any + Send + Sync>(&self, path: &str) -> BusResult<Arc<T>> {
        self.root.get_value(path)
    }

    pub fn unregister(&self, name: &str) -> BusResult<()> {
        self.root.unregister(name)
    }

    pub fn reload(&self, name: &str, entry: Entry) -> BusResult<Entry> {
        self.root.reload(name, entry)
    }

    pub fn register_event_handler<H>(&self, params: &[EventParam], handler: H) -> BusResult<HandlerId>
    where
        H: EventHandler + 'static,
    {
        self.bus.register_event_handler(params, handler)
    }

    pub fn unregister_event_handler(&self, id: HandlerId) -> BusResult<()> {
        self.bus.unregister_event_handler(id)
    }

    pub async fn send_event<I>(&self, events: I) -> BusResult<()>
    where
        I: IntoIterator<Item = Event>,
    {
        self.bus.send_event(events).await
    }

    pub async fn send(&self, event: Event) -> BusResult<()> {
        self.bus.send(event).await
    }

    /// Names of the modules added so far, in load order.
    pub fn modules(&self) -> Vec<String> {
        self.modules
            .lock()
            .iter()
            .map(|record| record.module.name().to_string())
            .collect()
    }

    /// Check `inject`, apply `module` and remember what it registered.
    ///
    /// When `apply` fails, every root name it registered so far is
    /// unregistered again before the error is returned.
    pub fn add_module<M: Module + 'static>(self: &Arc<Self>, module: M) -> BusResult<()> {
        let module: Arc<dyn Module> = Arc::new(module);
        let name = module.name().to_string();

        if self.modules.lock().iter().any(|record| record.module.name() == name) {
            return Err(BusError::NameConflict(name));
        }

        let missing: Vec<String> = module
            .inject()
            .iter()
            .filter(|dependency| !self.root.contains(dependency))
            .map(|dependency| dependency.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BusError::InjectionUnsatisfied { module: name, missing });
        }

        let names = self.apply_tracked(&module)?;
        debug!(module = %name, registered = ?names, "module added");
        self.modules.lock().push(ModuleRecord { module, names });
        Ok(())
    }

    /// Unregister everything `name` registered at the root and apply it again.
    pub fn reload_module(self: &Arc<Self>, name: &str) -> BusResult<()> {
        let (module, previous) = {
            let modules = self.modules.lock();
            let record = modules
                .iter()
                .find(|record| record.module.name() == name)
                .ok_or_else(|| BusError::lookup(name, "module was never added"))?;
            (Arc::clone(&record.module), record.names.clone())
        };

        for entry in previous.iter().rev() {
            if let Err(e) = self.root.unregister(entry) {
                warn!(module = name, entry = %entry, error = %e, "stale module entry");
            }
        }

        let names = match self.apply_tracked(&module) {
            Ok(names) => names,
            Err(e) => {
                self.modules.lock().retain(|record| record.module.name() != name);
                return Err(e);
            }
        };

        if let Some(record) = self
            .modules
            .lock()
            .iter_mut()
            .find(|record| record.module.name() == name)
        {
            record.names = names;
        }
        debug!(module = name, "module reloaded");
        Ok(())
    }

    /// Tear down every entry and drop every event handler.
    pub fn shutdown(&self) {
        self.root.unregister_all();
        self.bus.clear();
        self.modules.lock().clear();
        debug!("context shut down");
    }

    fn apply_tracked(self: &Arc<Self>, module: &Arc<dyn Module>) -> BusResult<Vec<String>> {
        self.root.start_tracking();
        let outcome = module.apply(self);
        let names = self.root.finish_tracking();

        match outcome {
            Ok(()) => Ok(names),
            Err(source) => {
                for entry in names.iter().rev() {
                    if let Err(e) = self.root.unregister(entry) {
                        warn!(module = module.name(), entry = %entry, error = %e, "rollback could not remove entry");
                    }
                }
                Err(BusError::ModuleApply {
                    module: module.name().to_string(),
                    source,
                })
            }
        }
    }
}
