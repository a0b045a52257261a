// ABOUTME: SMS engine turning DataReceived events into SmsReceived events and follow-up AT commands
// ABOUTME: Keeps one SmsSession per port; the lock is held only while a session is fed

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::bus::{Binding, BusResult, Context, EventBus, EventParam, HandlerId, Module, Service};
use crate::event::{Event, EventKind, SerialData};
use crate::logger::{Logger, LoggerFactory};
use crate::pdu::PduCodec;

pub mod session;

pub use session::{Action, SessionState, SmsSession};

/// Prefixes and command details of the modem dialogue.
///
/// # Example
///
/// ```rust
/// use sms_modem::sms::SmsConfig;
///
/// let config = SmsConfig::default().with_terminator("\r\n").with_delete_flag(0);
/// assert_eq!(config.notification_prefix, "+CMTI: ");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsConfig {
    /// New-message indication (default: `+CMTI: `)
    pub notification_prefix: String,

    /// Header of a read response (default: `+CMGR: `)
    pub read_response_prefix: String,

    /// Direct delivery header (default: `+CMT:`)
    pub push_prefix: String,

    /// Terminator of commands sent by the engine (default: `\r`)
    pub terminator: String,

    /// Second `+CMGD` parameter (default: 0, delete the given index only)
    pub delete_flag: u8,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            notification_prefix: "+CMTI: ".to_string(),
            read_response_prefix: "+CMGR: ".to_string(),
            push_prefix: "+CMT:".to_string(),
            terminator: "\r".to_string(),
            delete_flag: 0,
        }
    }
}

impl SmsConfig {
    pub fn with_notification_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.notification_prefix = prefix.into();
        self
    }

    pub fn with_read_response_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.read_response_prefix = prefix.into();
        self
    }

    pub fn with_push_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.push_prefix = prefix.into();
        self
    }

    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    pub fn with_delete_flag(mut self, delete_flag: u8) -> Self {
        self.delete_flag = delete_flag;
        self
    }
}

/// Drives an [`SmsSession`] per port from the bus.
pub struct SmsEngine {
    config: SmsConfig,
    codec: PduCodec,
    bus: EventBus,
    logger: Logger,
    sessions: Mutex<HashMap<String, SmsSession>>,
    handler: Mutex<Option<HandlerId>>,
}

impl SmsEngine {
    /// Subscribe a new engine to [`Event::DataReceived`].
    pub fn install(bus: &EventBus, config: SmsConfig, codec: PduCodec, logger: Logger) -> BusResult<Arc<Self>> {
        let engine = Arc::new(Self {
            config,
            codec,
            bus: bus.clone(),
            logger,
            sessions: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
        });

        let owner = Arc::downgrade(&engine);
        let id = bus.register_event_handler(
            &[EventParam::required("rx", EventKind::DataReceived)],
            move |binding: Binding| on_data_received(owner.clone(), binding),
        )?;
        *engine.handler.lock() = Some(id);
        Ok(engine)
    }

    /// Feed one inbound chunk and carry out the resulting actions.
    ///
    /// Every action runs even when publishing an earlier one fails, so a
    /// failing `SmsReceived` subscriber never suppresses the `+CMGD` that
    /// follows. The first failure is returned afterwards.
    pub async fn handle(&self, data: &SerialData) -> crate::Result<()> {
        let actions = {
            let mut sessions = self.sessions.lock();
            sessions
                .entry(data.port.clone())
                .or_insert_with(|| SmsSession::new(self.config.clone(), self.codec))
                .feed(&data.data)
        };

        let mut first_error = None;
        for action in actions {
            let outcome = match action {
                Action::Write(bytes) => self
                    .bus
                    .send(Event::write_request(data.port.clone(), bytes))
                    .await,
                Action::Deliver(sms) => {
                    debug!(port = %data.port, sender = %sms.sender, "message received");
                    self.bus.send(Event::SmsReceived(sms)).await
                }
                Action::Log(level, message) => {
                    if let Err(e) = self.logger.log(level, message).await {
                        warn!(port = %data.port, error = %e, "log event handler failed");
                    }
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                warn!(port = %data.port, error = %e, "SMS engine action failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn state(&self, port: &str) -> Option<SessionState> {
        self.sessions.lock().get(port).map(SmsSession::state)
    }

    pub fn pending_delete(&self, port: &str) -> Option<String> {
        self.sessions
            .lock()
            .get(port)
            .and_then(|session| session.pending_delete().map(str::to_string))
    }
}

impl Service for SmsEngine {
    fn unregister(&self) {
        if let Some(id) = self.handler.lock().take() {
            if let Err(e) = self.bus.unregister_event_handler(id) {
                warn!(error = %e, "sms handler already gone");
            }
        }
        self.sessions.lock().clear();
    }
}

async fn on_data_received(owner: Weak<SmsEngine>, binding: Binding) -> crate::Result<()> {
    let Some(engine) = owner.upgrade() else {
        return Ok(());
    };
    let Some(data) = binding.get("rx").and_then(Event::as_serial) else {
        return Ok(());
    };
    engine.handle(data).await
}

/// Installs an [`SmsEngine`] registered as the `sms` service.
#[derive(Debug, Default)]
pub struct SmsModule {
    config: SmsConfig,
}

impl SmsModule {
    pub fn new(config: SmsConfig) -> Self {
        Self { config }
    }
}

impl Module for SmsModule {
    fn name(&self) -> &str {
        "sms"
    }

    fn inject(&self) -> &[&str] {
        &["logger", "pdu", "serial"]
    }

    fn apply(&self, ctx: &Arc<Context>) -> crate::Result<()> {
        let logger = ctx.get_value::<LoggerFactory>("logger")?.logger("sms");
        let codec = *ctx.get_value::<PduCodec>("pdu.decode")?;
        let engine = SmsEngine::install(ctx.bus(), self.config.clone(), codec, logger)?;
        if let Err(e) = ctx.register_service("sms", Arc::clone(&engine)) {
            engine.unregister();
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_are_kept_per_port() {
        let bus = EventBus::new();
        let engine = SmsEngine::install(&bus, SmsConfig::default(), PduCodec, Logger::new(&bus, "sms")).unwrap();

        bus.send(Event::data_received("COM3", &b"+CMTI: \"ME\",3\r\n"[..]))
            .await
            .unwrap();
        bus.send(Event::data_received("COM4", &b"+CMTI: \"ME\""[..]))
            .await
            .unwrap();

        assert_eq!(engine.state("COM3"), Some(SessionState::AwaitingCommandResponse));
        assert_eq!(engine.pending_delete("COM3").as_deref(), Some("3"));
        assert_eq!(engine.state("COM4"), Some(SessionState::Idle));
        assert_eq!(engine.state("COM5"), None);
    }

    #[tokio::test]
    async fn unregister_stops_handling() {
        let bus = EventBus::new();
        let engine = SmsEngine::install(&bus, SmsConfig::default(), PduCodec, Logger::new(&bus, "sms")).unwrap();
        engine.unregister();

        bus.send(Event::data_received("COM3", &b"+CMTI: \"ME\",3\r\n"[..]))
            .await
            .unwrap();

        assert_eq!(bus.handler_count(), 0);
        assert_eq!(engine.state("COM3"), None);
    }

    #[tokio::test]
    async fn unregister_after_bus_cleared() {
        let bus = EventBus::new();
        let engine = SmsEngine::install(&bus, SmsConfig::default(), PduCodec, Logger::new(&bus, "sms")).unwrap();
        bus.clear();

        engine.unregister();
        engine.unregister();

        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn module_requires_dependencies() {
        let ctx = Context::new();
        let err = ctx.add_module(SmsModule::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::bus::BusError::InjectionUnsatisfied { ref missing, .. } if missing.len() == 3
        ));
    }
}
