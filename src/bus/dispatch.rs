// ABOUTME: Typed publish/subscribe with combinatorial parameter binding
// ABOUTME: Each complete binding is spawned as its own task and all tasks are awaited together

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::bus::binding::{bind, EventParam};
use crate::bus::error::{BusError, BusResult};
use crate::bus::traits::EventHandler;
use crate::event::{Event, EventKind};

/// Identifies one registered event handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

struct Subscription {
    params: Vec<EventParam>,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct HandlerTable {
    subscriptions: HashMap<HandlerId, Arc<Subscription>>,
    // Registration order per declared kind
    by_kind: HashMap<EventKind, Vec<HandlerId>>,
}

#[derive(Default)]
struct BusInner {
    table: RwLock<HandlerTable>,
    next_id: AtomicU64,
}

/// Event dispatcher. Cloning yields another handle to the same bus.
///
/// # Routing
///
/// `send_event` selects every handler that declared a parameter of the
/// event's kind or of any ancestor kind, once per call. Each selected
/// handler is then bound against the whole batch with
/// [`bind`](crate::bus::binding::bind) and invoked once per binding.
///
/// ```rust
/// use sms_modem::bus::{EventBus, EventParam};
/// use sms_modem::event::{Event, EventKind};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = EventBus::new();
/// bus.register_event_handler(
///     &[EventParam::required("rx", EventKind::DataReceived)],
///     |binding: sms_modem::bus::Binding| async move {
///         if let Some(data) = binding.get("rx").and_then(Event::as_serial) {
///             println!("{} bytes on {}", data.data.len(), data.port);
///         }
///         Ok(())
///     },
/// )?;
/// bus.send(Event::data_received("COM3", &b"OK\r\n"[..])).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Non-owning handle to an [`EventBus`].
#[derive(Clone, Default)]
pub struct WeakBus {
    inner: Weak<BusInner>,
}

impl WeakBus {
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

impl fmt::Debug for WeakBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBus")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakBus {
        WeakBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe `handler` with an explicit parameter declaration.
    ///
    /// Parameter names must be non-empty and unique. A handler declaring no
    /// parameters is accepted but never selected by dispatch.
    pub fn register_event_handler<H>(&self, params: &[EventParam], handler: H) -> BusResult<HandlerId>
    where
        H: EventHandler + 'static,
    {
        validate_params(params)?;

        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Arc::new(Subscription {
            params: params.to_vec(),
            handler: Arc::new(handler),
        });

        let mut table = self.inner.table.write();
        let mut seen = HashSet::new();
        for param in params {
            if seen.insert(param.kind) {
                table.by_kind.entry(param.kind).or_default().push(id);
            }
        }
        table.subscriptions.insert(id, subscription);
        trace!(%id, params = params.len(), "registered event handler");

        Ok(id)
    }

    pub fn unregister_event_handler(&self, id: HandlerId) -> BusResult<()> {
        let mut table = self.inner.table.write();
        if table.subscriptions.remove(&id).is_none() {
            return Err(BusError::lookup(id.to_string(), "event handler is not registered"));
        }
        for ids in table.by_kind.values_mut() {
            ids.retain(|existing| *existing != id);
        }
        table.by_kind.retain(|_, ids| !ids.is_empty());
        Ok(())
    }

    pub fn handler_count(&self) -> usize {
        self.inner.table.read().subscriptions.len()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        let mut table = self.inner.table.write();
        table.subscriptions.clear();
        table.by_kind.clear();
    }

    /// Dispatch a batch of events.
    ///
    /// Returns after every spawned invocation has finished. The first
    /// failure, in spawn order, is returned; other invocations still run to
    /// completion.
    pub async fn send_event<I>(&self, events: I) -> BusResult<()>
    where
        I: IntoIterator<Item = Event>,
    {
        let events: Vec<Arc<Event>> = events.into_iter().map(Arc::new).collect();
        let selected = self.select(&events);

        let mut tasks = Vec::new();
        for subscription in selected {
            for binding in bind(&subscription.params, &events) {
                tasks.push(tokio::spawn(subscription.handler.call(binding)));
            }
        }
        trace!(events = events.len(), invocations = tasks.len(), "dispatching");

        let mut first_error = None;
        for task in tasks {
            let outcome = match task.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => BusError::HandlerFailed(e),
                Err(join) => BusError::HandlerPanicked(join.to_string()),
            };
            first_error.get_or_insert(outcome);
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Dispatch a single event.
    pub async fn send(&self, event: Event) -> BusResult<()> {
        self.send_event([event]).await
    }

    fn select(&self, events: &[Arc<Event>]) -> Vec<Arc<Subscription>> {
        let table = self.inner.table.read();
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for event in events {
            for kind in event.kind().ancestors() {
                let Some(ids) = table.by_kind.get(&kind) else {
                    continue;
                };
                for id in ids {
                    if seen.insert(*id) {
                        if let Some(subscription) = table.subscriptions.get(id) {
                            selected.push(Arc::clone(subscription));
                        }
                    }
                }
            }
        }

        selected
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

fn validate_params(params: &[EventParam]) -> BusResult<()> {
    let mut names = HashSet::new();
    for param in params {
        if param.name.is_empty() {
            return Err(BusError::Signature("parameter name must not be empty".to_string()));
        }
        if !names.insert(param.name) {
            return Err(BusError::Signature(format!(
                "parameter '{}' is declared more than once",
                param.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::binding::Binding;
    use crate::event::{LogEvent, LogLevel};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn counter_handler(counter: Arc<AtomicUsize>) -> impl EventHandler {
        move |_binding: Binding| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn log_event(message: &str) -> Event {
        Event::Log(LogEvent::new(LogLevel::Info, message))
    }

    #[tokio::test]
    async fn handler_invoked_once_for_two_unrelated_events() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register_event_handler(
            &[
                EventParam::required("rx", EventKind::DataReceived),
                EventParam::required("log", EventKind::Log),
            ],
            counter_handler(calls.clone()),
        )
        .unwrap();

        bus.send_event([Event::data_received("COM3", &b"x"[..]), log_event("y")])
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn optional_param_absent_on_single_event() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.register_event_handler(
            &[
                EventParam::required("rx", EventKind::DataReceived),
                EventParam::optional("log", EventKind::Log),
            ],
            move |binding: Binding| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(binding.get("log").is_none());
                    Ok(())
                }
            },
        )
        .unwrap();

        bus.send(Event::data_received("COM3", &b"x"[..])).await.unwrap();

        assert_eq!(*seen.lock(), vec![true]);
    }

    #[tokio::test]
    async fn ancestor_subscription_receives_descendants() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register_event_handler(
            &[EventParam::required("any", EventKind::Serial)],
            counter_handler(calls.clone()),
        )
        .unwrap();

        bus.send(Event::data_sent("COM3", &b"AT\r"[..])).await.unwrap();
        bus.send(log_event("ignored")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_selected_once_per_call() {
        // Reachable through both DataReceived and Serial, still one selection.
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register_event_handler(
            &[
                EventParam::required("rx", EventKind::DataReceived),
                EventParam::optional("any", EventKind::Serial),
            ],
            counter_handler(calls.clone()),
        )
        .unwrap();

        bus.send(Event::data_received("COM3", &b"x"[..])).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_failure_surfaces_after_all_invocations() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register_event_handler(
            &[EventParam::required("rx", EventKind::DataReceived)],
            |_binding: Binding| async move { Err::<(), crate::Error>("boom".into()) },
        )
        .unwrap();
        bus.register_event_handler(
            &[EventParam::required("rx", EventKind::DataReceived)],
            counter_handler(calls.clone()),
        )
        .unwrap();

        let result = bus
            .send_event([
                Event::data_received("COM3", &b"a"[..]),
                Event::data_received("COM3", &b"b"[..]),
            ])
            .await;

        assert!(matches!(result, Err(BusError::HandlerFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_handler_reported() {
        let bus = EventBus::new();
        bus.register_event_handler(
            &[EventParam::required("log", EventKind::Log)],
            |binding: Binding| async move {
                if binding.get("log").is_some() {
                    panic!("handler panic");
                }
                Ok(())
            },
        )
        .unwrap();

        let result = bus.send(log_event("x")).await;
        assert!(matches!(result, Err(BusError::HandlerPanicked(_))));
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let id = bus
            .register_event_handler(
                &[EventParam::required("log", EventKind::Log)],
                counter_handler(calls.clone()),
            )
            .unwrap();

        bus.unregister_event_handler(id).unwrap();
        bus.send(log_event("x")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.handler_count(), 0);
        assert!(matches!(bus.unregister_event_handler(id), Err(BusError::Lookup { .. })));
    }

    #[test]
    fn duplicate_param_names_rejected() {
        let bus = EventBus::new();
        let result = bus.register_event_handler(
            &[
                EventParam::required("e", EventKind::Log),
                EventParam::required("e", EventKind::DataSent),
            ],
            counter_handler(Arc::new(AtomicUsize::new(0))),
        );
        assert!(matches!(result, Err(BusError::Signature(_))));
    }

    #[tokio::test]
    async fn handler_without_params_is_never_selected() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register_event_handler(&[], counter_handler(calls.clone()))
            .unwrap();

        bus.send(log_event("x")).await.unwrap();

        assert_eq!(bus.handler_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn weak_handle_does_not_keep_bus_alive() {
        let bus = EventBus::new();
        let weak = bus.downgrade();
        assert!(weak.upgrade().is_some());
        drop(bus);
        assert!(weak.upgrade().is_none());
    }
}
