// ABOUTME: Event taxonomy shared by the bus, the serial transport and the SMS engine
// ABOUTME: Events are immutable values whose kinds form a fixed single-inheritance hierarchy

use bytes::Bytes;
use chrono::{DateTime, Local};
use std::fmt;

use crate::pdu::TextEncoding;

/// Kind of an [`Event`], arranged as a tree rooted at [`EventKind::Event`].
///
/// ```text
/// Event
/// ├── Serial
/// │   ├── DataReceived
/// │   ├── WriteRequest
/// │   └── DataSent
/// ├── Sms
/// │   └── SmsReceived
/// └── Log
/// ```
///
/// Subscribing to an inner kind (e.g. `Serial`) matches every event whose
/// kind descends from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Event,
    Serial,
    DataReceived,
    WriteRequest,
    DataSent,
    Sms,
    SmsReceived,
    Log,
}

impl EventKind {
    /// Direct parent in the hierarchy, `None` for the root.
    pub fn parent(self) -> Option<EventKind> {
        match self {
            EventKind::Event => None,
            EventKind::Serial | EventKind::Sms | EventKind::Log => Some(EventKind::Event),
            EventKind::DataReceived | EventKind::WriteRequest | EventKind::DataSent => {
                Some(EventKind::Serial)
            }
            EventKind::SmsReceived => Some(EventKind::Sms),
        }
    }

    /// This kind followed by each ancestor, ending with the root.
    pub fn ancestors(self) -> impl Iterator<Item = EventKind> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    /// Length of the ancestor chain, counting this kind. The root has depth 1.
    pub fn depth(self) -> usize {
        self.ancestors().count()
    }

    /// True when `self` is `other` or descends from it.
    pub fn is_a(self, other: EventKind) -> bool {
        self.ancestors().any(|kind| kind == other)
    }
}

/// Raw bytes moving through one serial port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialData {
    pub port: String,
    pub data: Bytes,
}

impl SerialData {
    pub fn new(port: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            port: port.into(),
            data: data.into(),
        }
    }
}

/// A fully decoded incoming short message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmsReceived {
    pub sca_number: String,
    pub sender: String,
    pub text: String,
    pub encoding: TextEncoding,
}

impl fmt::Display for SmsReceived {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SmsReceived(from={}, text_type={}, text={}, sca_number={})",
            self.sender, self.encoding, self.text, self.sca_number
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl LogEvent {
    /// Create a log event stamped with the current local time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Local::now(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Every value that can travel over the [`EventBus`](crate::bus::EventBus).
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Bytes read from a serial port.
    DataReceived(SerialData),
    /// Bytes some component wants written to a serial port.
    WriteRequest(SerialData),
    /// Bytes that have been written to a serial port.
    DataSent(SerialData),
    SmsReceived(SmsReceived),
    Log(LogEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::DataReceived(_) => EventKind::DataReceived,
            Event::WriteRequest(_) => EventKind::WriteRequest,
            Event::DataSent(_) => EventKind::DataSent,
            Event::SmsReceived(_) => EventKind::SmsReceived,
            Event::Log(_) => EventKind::Log,
        }
    }

    /// Runtime instance check against any kind in the hierarchy.
    pub fn is_instance_of(&self, kind: EventKind) -> bool {
        self.kind().is_a(kind)
    }

    pub fn data_received(port: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Event::DataReceived(SerialData::new(port, data))
    }

    pub fn write_request(port: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Event::WriteRequest(SerialData::new(port, data))
    }

    pub fn data_sent(port: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Event::DataSent(SerialData::new(port, data))
    }

    /// Payload of any serial event.
    pub fn as_serial(&self) -> Option<&SerialData> {
        match self {
            Event::DataReceived(data) | Event::WriteRequest(data) | Event::DataSent(data) => {
                Some(data)
            }
            _ => None,
        }
    }

    pub fn as_sms(&self) -> Option<&SmsReceived> {
        match self {
            Event::SmsReceived(sms) => Some(sms),
            _ => None,
        }
    }

    pub fn as_log(&self) -> Option<&LogEvent> {
        match self {
            Event::Log(log) => Some(log),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::DataReceived(d) => write!(f, "RX({}): {:?}", d.port, d.data),
            Event::WriteRequest(d) => write!(f, "TX-REQ({}): {:?}", d.port, d.data),
            Event::DataSent(d) => write!(f, "TX({}): {:?}", d.port, d.data),
            Event::SmsReceived(sms) => sms.fmt(f),
            Event::Log(log) => log.fmt(f),
        }
    }
}
