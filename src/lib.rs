pub mod at;
pub mod bus;
pub mod event;
pub mod logger;
pub mod pdu;
pub mod serial;
pub mod sms;


pub use at::{AtCommand, AtError, Mode, Param};
pub use bus::{Binding, BusError, Context, EventBus, EventParam, Module, Service};
pub use event::{Event, EventKind, LogEvent, LogLevel, SerialData, SmsReceived};
pub use logger::{LogConfig, LogModule, Logger};
pub use pdu::{DecodedPdu, PduCodec, PduError, PduModule, TextEncoding};
pub use serial::{SerialConfig, SerialError, SerialModule, SerialService};
pub use sms::{SmsConfig, SmsEngine, SmsModule};

/// Error returned by handlers and module `apply` bodies.
///
/// Each layer has its own error enum (`BusError`, `AtError`, `PduError`,
/// `SerialError`); handlers mix several of them, so the bus boxes whatever
/// they return.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for handlers and modules.
///
/// # Examples
///
/// Wiring a modem on a real serial device:
///
/// ```rust,no_run
/// use sms_modem::{
///     at::AtModule, Context, LogConfig, LogModule, PduModule, SerialConfig, SerialModule,
///     SmsConfig, SmsModule,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ctx = Context::new();
///     ctx.add_module(LogModule::new(LogConfig::default()))?;
///     ctx.add_module(AtModule)?;
///     ctx.add_module(PduModule)?;
///     ctx.add_module(SerialModule::new().with_port(SerialConfig::new("/dev/ttyUSB2")))?;
///     ctx.add_module(SmsModule::new(SmsConfig::default()))?;
///
///     tokio::signal::ctrl_c().await?;
///     ctx.shutdown();
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
