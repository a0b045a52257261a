// ABOUTME: Opens a physical serial device and bridges its blocking I/O onto an async duplex stream
// ABOUTME: Two blocking threads pump bytes; both exit once the async side of the duplex is dropped

use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::config::SerialConfig;
use super::error::SerialResult;

/// Open the device named by `config.port` as 8N1 and return an async stream.
///
/// Must be called from within a Tokio runtime.
pub fn open_port(config: &SerialConfig) -> SerialResult<DuplexStream> {
    let handle = Handle::try_current().map_err(io::Error::other)?;

    let device = serialport::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(config.read_timeout)
        .open()?;
    let reader = device.try_clone()?;
    debug!(port = %config.port, baud_rate = config.baud_rate, "opened serial device");

    let (host, bridge) = tokio::io::duplex(config.read_buffer_capacity);
    let (from_host, to_host) = tokio::io::split(bridge);

    let closed = Arc::new(AtomicBool::new(false));
    let capacity = config.read_buffer_capacity;

    let port = config.port.clone();
    let inbound = handle.clone();
    let reader_closed = Arc::clone(&closed);
    std::thread::spawn(move || pump_device_to_host(&port, reader, to_host, inbound, capacity, &reader_closed));

    let port = config.port.clone();
    std::thread::spawn(move || {
        pump_host_to_device(&port, device, from_host, handle, capacity);
        closed.store(true, Ordering::Release);
    });

    Ok(host)
}

fn pump_device_to_host(
    port: &str,
    mut device: Box<dyn SerialPort>,
    mut to_host: tokio::io::WriteHalf<DuplexStream>,
    handle: Handle,
    capacity: usize,
    closed: &AtomicBool,
) {
    let mut buf = vec![0u8; capacity];
    // Host side gone: the writer pump has seen end of stream
    while !closed.load(Ordering::Acquire) {
        let n = match device.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                warn!(port, error = %e, "serial read failed");
                break;
            }
        };
        if handle.block_on(to_host.write_all(&buf[..n])).is_err() {
            break;
        }
    }
    debug!(port, "device reader stopped");
}

fn pump_host_to_device(
    port: &str,
    mut device: Box<dyn SerialPort>,
    mut from_host: tokio::io::ReadHalf<DuplexStream>,
    handle: Handle,
    capacity: usize,
) {
    let mut buf = vec![0u8; capacity];
    loop {
        let n = match handle.block_on(from_host.read(&mut buf)) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if let Err(e) = device.write_all(&buf[..n]).and_then(|()| device.flush()) {
            warn!(port, error = %e, "serial write failed");
            break;
        }
    }
    debug!(port, "device writer stopped");
}
