// ABOUTME: Serial line settings for one modem port
// ABOUTME: Defaults match the common 115200 8N1 GSM modem setup

use std::time::Duration;

/// Configuration for one serial port.
///
/// # Example
///
/// ```rust
/// use sms_modem::serial::SerialConfig;
/// use std::time::Duration;
///
/// let config = SerialConfig::new("/dev/ttyUSB2")
///     .with_baud_rate(9600)
///     .with_read_timeout(Duration::from_millis(250));
/// assert_eq!(config.port, "/dev/ttyUSB2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path or name; also the key events are tagged with
    pub port: String,

    /// Line speed (default: 115200)
    pub baud_rate: u32,

    /// Blocking read timeout of the device (default: 100ms)
    ///
    /// Bounds how long the device reader takes to notice the connection
    /// was closed.
    pub read_timeout: Duration,

    /// Bytes reserved per read (default: 4KB)
    pub read_buffer_capacity: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(100),
            read_buffer_capacity: 4 * 1024,
        }
    }
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.read_timeout, Duration::from_millis(100));
        assert_eq!(config.read_buffer_capacity, 4096);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let config = SerialConfig::new("COM3").with_read_buffer_capacity(0);
        assert_eq!(config.read_buffer_capacity, 1);
    }
}
