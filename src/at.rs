// ABOUTME: AT command construction and line-oriented response extraction for GSM modems
// ABOUTME: Implements the `{prefix}{command}[?|=?|=params]{terminator}` wire grammar

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::bus::{Context, Module};

pub const DEFAULT_PREFIX: &str = "AT";
pub const DEFAULT_TERMINATOR: &str = "\r\n";

/// Final result code terminating a successful response.
pub const RESULT_OK: &str = "OK";
/// Final result code terminating a failed response.
pub const RESULT_ERROR: &str = "ERROR";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AtError {
    #[error("Invalid AT mode '{0}': must be one of 'set', 'read', 'test', 'exec'")]
    InvalidMode(String),

    #[error("AT command error: modem returned ERROR")]
    Protocol,
}

/// How a command is issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    /// `AT+CMD=p1,p2`
    #[default]
    Set,
    /// `AT+CMD?`
    Read,
    /// `AT+CMD=?`
    Test,
    /// `AT+CMD`
    Exec,
}

impl FromStr for Mode {
    type Err = AtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "set" => Ok(Mode::Set),
            "read" => Ok(Mode::Read),
            "test" => Ok(Mode::Test),
            "exec" => Ok(Mode::Exec),
            _ => Err(AtError::InvalidMode(s.to_string())),
        }
    }
}

/// A single command parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Param>),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::None => Ok(()),
            Param::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Param::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part for whole numbers ("2.0")
            Param::Float(x) => write!(f, "{x:?}"),
            Param::Str(s) => f.write_str(s),
            Param::List(items) => write_joined(f, items),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, params: &[Param]) -> fmt::Result {
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{param}")?;
    }
    Ok(())
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

macro_rules! impl_int_param {
    ($($t:ty),*) => {
        $(impl From<$t> for Param {
            fn from(value: $t) -> Self {
                Param::Int(i64::from(value))
            }
        })*
    };
}

impl_int_param!(i8, i16, i32, i64, u8, u16, u32);

// Values past i64::MAX keep their exact decimal text
macro_rules! impl_wide_int_param {
    ($($t:ty),*) => {
        $(impl From<$t> for Param {
            fn from(value: $t) -> Self {
                i64::try_from(value).map_or_else(|_| Param::Str(value.to_string()), Param::Int)
            }
        })*
    };
}

impl_wide_int_param!(u64, usize);

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Float(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Str(value)
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(values: Vec<T>) -> Self {
        Param::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Param::None)
    }
}

/// An outgoing AT command.
///
/// ```rust
/// use sms_modem::at::{AtCommand, Mode};
///
/// let cmd = AtCommand::new("+CMGD").param(3).param(0).terminator("\r");
/// assert_eq!(cmd.to_string(), "AT+CMGD=3,0\r");
///
/// let query = AtCommand::new("+CSQ").mode(Mode::Exec);
/// assert_eq!(query.to_string(), "AT+CSQ\r\n");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct AtCommand {
    pub prefix: String,
    pub command: String,
    pub mode: Mode,
    pub params: Vec<Param>,
    pub terminator: String,
}

impl AtCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            command: command.into(),
            mode: Mode::Set,
            params: Vec::new(),
            terminator: DEFAULT_TERMINATOR.to_string(),
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn param(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn params<I, P>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    pub fn to_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::from(self.to_string())
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.command)?;
        match self.mode {
            Mode::Read => f.write_str("?")?,
            Mode::Test => f.write_str("=?")?,
            Mode::Exec => {}
            Mode::Set => {
                f.write_str("=")?;
                write_joined(f, &self.params)?;
            }
        }
        f.write_str(&self.terminator)
    }
}

/// Build a command string with the default prefix and terminator.
///
/// `mode` is matched case-insensitively against `set`, `read`, `test` and
/// `exec`; params are ignored by every mode except `set`.
pub fn build(command: &str, params: &[Param], mode: &str) -> Result<String, AtError> {
    let mode = mode.parse::<Mode>()?;
    Ok(AtCommand::new(command)
        .mode(mode)
        .params(params.iter().cloned())
        .to_string())
}

/// Collect the payloads of lines starting with `expected` from a response.
///
/// Scanning stops at an `OK` line. An `ERROR` line seen before that fails
/// the whole response. An empty `expected` collects nothing.
pub fn parse_expect(text: &str, expected: &str) -> Result<Vec<String>, AtError> {
    let mut result = Vec::new();
    let lines = text
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty());

    for line in lines {
        if line == RESULT_OK {
            break;
        }
        if line == RESULT_ERROR {
            return Err(AtError::Protocol);
        }
        if expected.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix(expected) {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            result.push(rest.to_string());
        }
    }

    Ok(result)
}

/// Signature of the `at.command.build` registry value.
pub type BuildFn = fn(&str, &[Param], &str) -> Result<String, AtError>;
/// Signature of the `at.command.expect` registry value.
pub type ExpectFn = fn(&str, &str) -> Result<Vec<String>, AtError>;

/// Publishes the AT helpers as `at.command.build` and `at.command.expect`.
#[derive(Debug, Default)]
pub struct AtModule;

impl Module for AtModule {
    fn name(&self) -> &str {
        "at"
    }

    fn apply(&self, ctx: &Arc<Context>) -> crate::Result<()> {
        let at = ctx.register_node("at")?;
        let command = at.register_node("command")?;
        command.register_value("build", build as BuildFn)?;
        command.register_value("expect", parse_expect as ExpectFn)?;
        Ok(())
    }
}
