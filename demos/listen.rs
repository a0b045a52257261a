// ABOUTME: Command-line listener printing every SMS a serial modem receives
// ABOUTME: Wires the logger, AT, PDU, serial and SMS modules onto one context

//! # Modem Listener
//!
//! Opens one serial port, waits for new-message notifications and prints each
//! decoded message until interrupted with Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! # Default device and baud rate
//! cargo run --example listen
//!
//! # A specific device, with debug logging
//! cargo run --example listen -- --port /dev/ttyUSB2 --baud 9600 -d
//!
//! # Only forward warnings and errors from the modules
//! cargo run --example listen -- --port COM3 --min-level warning
//! ```

use argh::FromArgs;
use sms_modem::at::AtModule;
use sms_modem::bus::{Binding, EventParam};
use sms_modem::event::{Event, EventKind, LogLevel};
use sms_modem::{Context, LogConfig, LogModule, PduModule, SerialConfig, SerialModule, SmsConfig, SmsModule};
use std::error::Error;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Print SMS messages received by a serial modem
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the serial device of the modem (default: /dev/ttyUSB0)
    #[argh(option, short = 'p')]
    port: Option<String>,

    /// the baud rate of the serial line (default: 115200)
    #[argh(option, short = 'b')]
    baud: Option<u32>,

    /// lowest module log level to print: debug, info, warning or error (default: debug)
    #[argh(option, from_str_fn(parse_level))]
    min_level: Option<LogLevel>,

    /// second +CMGD parameter used after each read (default: 0)
    #[argh(option)]
    delete_flag: Option<u8>,
}

fn parse_level(value: &str) -> Result<LogLevel, String> {
    match value.to_ascii_lowercase().as_str() {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warning" | "warn" => Ok(LogLevel::Warning),
        "error" => Ok(LogLevel::Error),
        other => Err(format!("unknown log level '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut serial = SerialConfig::new(cli_args.port.unwrap_or_else(|| "/dev/ttyUSB0".to_string()));
    if let Some(baud) = cli_args.baud {
        serial = serial.with_baud_rate(baud);
    }
    let log = LogConfig::default().with_min_level(cli_args.min_level.unwrap_or(LogLevel::Debug));
    let sms = SmsConfig::default().with_delete_flag(cli_args.delete_flag.unwrap_or(0));

    info!("Opening {} at {} baud", serial.port, serial.baud_rate);

    let ctx = Context::new();
    ctx.add_module(LogModule::new(log))?;
    ctx.add_module(AtModule)?;
    ctx.add_module(PduModule)?;
    ctx.add_module(SerialModule::new().with_port(serial))?;
    ctx.add_module(SmsModule::new(sms))?;

    ctx.register_event_handler(
        &[EventParam::required("sms", EventKind::SmsReceived)],
        |binding: Binding| async move {
            if let Some(sms) = binding.get("sms").and_then(Event::as_sms) {
                println!("[{}] ({}) {}", sms.sender, sms.encoding, sms.text);
            }
            Ok(())
        },
    )?;

    info!("Listening, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    ctx.shutdown();
    Ok(())
}
