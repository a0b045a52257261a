// ABOUTME: Per-port SMS state machine: line reassembly, CMTI -> CMGR -> decode -> CMGD sequencing
// ABOUTME: Pure and synchronous; callers execute the returned actions

use bytes::Bytes;
use std::fmt;

use super::SmsConfig;
use crate::at::{self, AtCommand, RESULT_ERROR, RESULT_OK};
use crate::event::{LogLevel, SmsReceived};
use crate::pdu::PduCodec;

/// Read a stored message by index.
pub const READ_COMMAND: &str = "+CMGR";
/// Delete a stored message by index.
pub const DELETE_COMMAND: &str = "+CMGD";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A `+CMT:` push header was seen; the next line is the PDU
    AwaitingPdu,
    /// `+CMGR` was sent; lines accumulate until `OK` or `ERROR`
    AwaitingCommandResponse,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::AwaitingPdu => f.write_str("awaiting pdu"),
            SessionState::AwaitingCommandResponse => f.write_str("awaiting command response"),
        }
    }
}

/// Side effect requested by [`SmsSession::feed`].
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Bytes to send to the modem
    Write(Bytes),
    /// A decoded message to publish
    Deliver(SmsReceived),
    Log(LogLevel, String),
}

#[derive(Debug)]
pub struct SmsSession {
    config: SmsConfig,
    codec: PduCodec,
    buffer: Vec<u8>,
    state: SessionState,
    response: Vec<String>,
    pending_delete: Option<String>,
}

impl SmsSession {
    pub fn new(config: SmsConfig, codec: PduCodec) -> Self {
        Self {
            config,
            codec,
            buffer: Vec::new(),
            state: SessionState::Idle,
            response: Vec::new(),
            pending_delete: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Index to delete once the pending read completes.
    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    /// Bytes received but not yet terminated by `\n`.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Append received bytes and process every completed line.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Action> {
        self.buffer.extend_from_slice(data);

        let mut actions = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if line.is_empty() {
                continue;
            }
            actions.push(Action::Log(LogLevel::Debug, format!("serial rx: {line}")));
            self.handle_line(line, &mut actions);
        }
        actions
    }

    fn handle_line(&mut self, line: String, actions: &mut Vec<Action>) {
        match self.state {
            SessionState::Idle => self.on_idle_line(&line, actions),
            SessionState::AwaitingPdu => {
                self.state = SessionState::Idle;
                self.deliver(&line, actions);
            }
            SessionState::AwaitingCommandResponse => {
                let complete = line == RESULT_OK || line == RESULT_ERROR;
                self.response.push(line);
                if complete {
                    self.complete_read(actions);
                    self.response.clear();
                    self.state = SessionState::Idle;
                }
            }
        }
    }

    fn on_idle_line(&mut self, line: &str, actions: &mut Vec<Action>) {
        if line.starts_with(self.config.notification_prefix.trim_end()) {
            let index = at::parse_expect(line, &self.config.notification_prefix)
                .ok()
                .and_then(|fields| fields.into_iter().next())
                .and_then(|field| storage_index(&field));
            let Some(index) = index else {
                actions.push(Action::Log(LogLevel::Warning, format!("malformed notification: {line}")));
                return;
            };

            actions.push(Action::Log(LogLevel::Info, format!("new message at index {index}")));
            let read = AtCommand::new(READ_COMMAND)
                .param(index.as_str())
                .terminator(self.config.terminator.as_str());
            actions.push(Action::Write(read.to_bytes()));
            self.pending_delete = Some(index);
            self.response.clear();
            self.state = SessionState::AwaitingCommandResponse;
        } else if line.starts_with(self.config.push_prefix.trim_end()) {
            self.state = SessionState::AwaitingPdu;
        }
    }

    fn complete_read(&mut self, actions: &mut Vec<Action>) {
        let text = self.response.join("\n");
        if let Err(e) = at::parse_expect(&text, &self.config.read_response_prefix) {
            actions.push(Action::Log(LogLevel::Error, format!("{READ_COMMAND} failed: {e}")));
            return;
        }

        let header = self.config.read_response_prefix.trim_end();
        let pdu = self
            .response
            .iter()
            .position(|line| line.starts_with(header))
            .and_then(|header_at| self.response.get(header_at + 1))
            .filter(|line| *line != RESULT_OK && *line != RESULT_ERROR)
            .cloned();
        let Some(pdu) = pdu else {
            actions.push(Action::Log(
                LogLevel::Warning,
                format!("{READ_COMMAND} response carried no {header} message"),
            ));
            return;
        };

        if self.deliver(&pdu, actions) {
            if let Some(index) = self.pending_delete.take() {
                let delete = AtCommand::new(DELETE_COMMAND)
                    .param(index.as_str())
                    .param(self.config.delete_flag)
                    .terminator(self.config.terminator.as_str());
                actions.push(Action::Write(delete.to_bytes()));
                actions.push(Action::Log(LogLevel::Info, format!("deleting message at index {index}")));
            }
        }
    }

    fn deliver(&self, pdu: &str, actions: &mut Vec<Action>) -> bool {
        match self.codec.decode(pdu) {
            Ok(decoded) => {
                let sms = SmsReceived::from(decoded);
                actions.push(Action::Log(
                    LogLevel::Info,
                    format!("message from {} via {}: {}", sms.sender, sms.sca_number, sms.text),
                ));
                actions.push(Action::Deliver(sms));
                true
            }
            Err(e) => {
                actions.push(Action::Log(LogLevel::Error, format!("PDU decode failed: {e}")));
                false
            }
        }
    }
}

/// Storage index from a `"ME",3` notification body.
fn storage_index(field: &str) -> Option<String> {
    let mut parts = field.split(',');
    let _storage = parts.next()?;
    let index = parts.next()?.trim();
    if index.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(index.to_string())
}
