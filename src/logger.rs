// ABOUTME: Named loggers publishing LogEvents on the bus, and a sink forwarding them to tracing
// ABOUTME: Loggers hold a weak bus handle and go quiet once the bus is dropped

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bus::{Binding, BusResult, Context, EventBus, EventParam, HandlerId, Module, Service, WeakBus};
use crate::event::{Event, EventKind, LogEvent, LogLevel};

/// Publishes `[name] message` log events.
#[derive(Clone, Debug)]
pub struct Logger {
    bus: WeakBus,
    name: String,
}

impl Logger {
    pub fn new(bus: &EventBus, name: impl Into<String>) -> Self {
        Self {
            bus: bus.downgrade(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn log(&self, level: LogLevel, message: impl AsRef<str>) -> BusResult<()> {
        let Some(bus) = self.bus.upgrade() else {
            return Ok(());
        };
        let message = format!("[{}] {}", self.name, message.as_ref());
        bus.send(Event::Log(LogEvent::new(level, message))).await
    }

    pub async fn debug(&self, message: impl AsRef<str>) -> BusResult<()> {
        self.log(LogLevel::Debug, message).await
    }

    pub async fn info(&self, message: impl AsRef<str>) -> BusResult<()> {
        self.log(LogLevel::Info, message).await
    }

    pub async fn warning(&self, message: impl AsRef<str>) -> BusResult<()> {
        self.log(LogLevel::Warning, message).await
    }

    pub async fn error(&self, message: impl AsRef<str>) -> BusResult<()> {
        self.log(LogLevel::Error, message).await
    }
}

/// Hands out [`Logger`]s; registered as `logger`.
#[derive(Clone, Debug)]
pub struct LoggerFactory {
    bus: WeakBus,
}

impl LoggerFactory {
    pub fn new(bus: &EventBus) -> Self {
        Self { bus: bus.downgrade() }
    }

    pub fn logger(&self, name: impl Into<String>) -> Logger {
        Logger {
            bus: self.bus.clone(),
            name: name.into(),
        }
    }
}

/// Configuration for the tracing sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    /// Events below this level are dropped (default: Debug)
    pub min_level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Debug,
        }
    }
}

impl LogConfig {
    pub fn with_min_level(mut self, min_level: LogLevel) -> Self {
        self.min_level = min_level;
        self
    }
}

/// Subscription forwarding [`Event::Log`] into `tracing`; removed on unregister.
pub struct TracingSink {
    bus: EventBus,
    handler: Mutex<Option<HandlerId>>,
}

impl TracingSink {
    pub fn install(bus: &EventBus, config: LogConfig) -> BusResult<Arc<Self>> {
        let min_level = config.min_level;
        let id = bus.register_event_handler(
            &[EventParam::required("log", EventKind::Log)],
            move |binding: Binding| forward_to_tracing(min_level, binding),
        )?;
        Ok(Arc::new(Self {
            bus: bus.clone(),
            handler: Mutex::new(Some(id)),
        }))
    }
}

impl Service for TracingSink {
    fn unregister(&self) {
        if let Some(id) = self.handler.lock().take() {
            if let Err(e) = self.bus.unregister_event_handler(id) {
                warn!(error = %e, "log sink handler already gone");
            }
        }
    }
}

async fn forward_to_tracing(min_level: LogLevel, binding: Binding) -> crate::Result<()> {
    let Some(event) = binding.get("log").and_then(Event::as_log) else {
        return Ok(());
    };
    if event.level < min_level {
        return Ok(());
    }

    let timestamp = event.timestamp.format("%Y-%m-%d %H:%M:%S");
    match event.level {
        LogLevel::Debug => debug!(target: "sms_modem::log", %timestamp, "{}", event.message),
        LogLevel::Info => info!(target: "sms_modem::log", %timestamp, "{}", event.message),
        LogLevel::Warning => warn!(target: "sms_modem::log", %timestamp, "{}", event.message),
        LogLevel::Error => error!(target: "sms_modem::log", %timestamp, "{}", event.message),
    }
    Ok(())
}

/// Registers `logger` (a [`LoggerFactory`]) and `log_sink` (a [`TracingSink`]).
#[derive(Default)]
pub struct LogModule {
    config: LogConfig,
}

impl LogModule {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }
}

impl Module for LogModule {
    fn name(&self) -> &str {
        "logger"
    }

    fn apply(&self, ctx: &Arc<Context>) -> crate::Result<()> {
        ctx.register_value("logger", LoggerFactory::new(ctx.bus()))?;
        let sink = TracingSink::install(ctx.bus(), self.config)?;
        if let Err(e) = ctx.register_service("log_sink", Arc::clone(&sink)) {
            sink.unregister();
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn capture(bus: &EventBus) -> mpsc::UnboundedReceiver<LogEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.register_event_handler(&[EventParam::required("log", EventKind::Log)], move |binding: Binding| {
            let tx = tx.clone();
            async move {
                if let Some(event) = binding.get("log").and_then(Event::as_log) {
                    let _ = tx.send(event.clone());
                }
                Ok(())
            }
        })
        .unwrap();
        rx
    }

    #[tokio::test]
    async fn messages_are_prefixed_with_logger_name() {
        let bus = EventBus::new();
        let mut events = capture(&bus);

        LoggerFactory::new(&bus).logger("sms").warning("no header").await.unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.level, LogLevel::Warning);
        assert_eq!(event.message, "[sms] no header");
    }

    #[tokio::test]
    async fn logger_outliving_bus_is_silent() {
        let bus = EventBus::new();
        let logger = Logger::new(&bus, "pdu");
        drop(bus);
        assert!(logger.info("dropped").await.is_ok());
    }

    #[tokio::test]
    async fn module_registers_factory_and_sink() {
        let ctx = Context::new();
        ctx.add_module(LogModule::new(LogConfig::default().with_min_level(LogLevel::Info)))
            .unwrap();

        assert!(ctx.get_value::<LoggerFactory>("logger").is_ok());
        assert_eq!(ctx.bus().handler_count(), 1);
        ctx.get_value::<LoggerFactory>("logger")
            .unwrap()
            .logger("root")
            .debug("below threshold")
            .await
            .unwrap();

        ctx.unregister("log_sink").unwrap();
        assert_eq!(ctx.bus().handler_count(), 0);
    }
}
