// ABOUTME: Serial transport service bridging a modem byte stream to DataReceived/WriteRequest/DataSent
// ABOUTME: One reader, one ordered dispatcher and one writer task per port, tracked in a PortDirectory

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::bus::{Binding, Context, EventBus, EventParam, HandlerId, Module, Service};
use crate::event::{Event, EventKind};

pub mod config;
pub mod connection;
pub mod error;
pub mod port;

pub use config::SerialConfig;
pub use connection::{ReadConnection, WriteConnection};
pub use error::{SerialError, SerialResult};
pub use port::open_port;

/// Live serial services indexed by port name.
///
/// Holds weak references only; a service whose last strong reference is
/// gone, or which has been torn down, no longer resolves.
#[derive(Clone, Default)]
pub struct PortDirectory {
    ports: Arc<RwLock<HashMap<String, Weak<SerialService>>>>,
}

impl PortDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live service owning `port`.
    pub fn lookup(&self, port: &str) -> Option<Arc<SerialService>> {
        self.ports
            .read()
            .get(port)
            .and_then(Weak::upgrade)
            .filter(|service| service.is_alive())
    }

    pub fn ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self
            .ports
            .read()
            .iter()
            .filter(|(_, service)| service.upgrade().is_some_and(|s| s.is_alive()))
            .map(|(port, _)| port.clone())
            .collect();
        ports.sort();
        ports
    }

    fn claim(&self, service: &Arc<SerialService>) -> SerialResult<()> {
        let mut ports = self.ports.write();
        let live = ports
            .get(&service.port)
            .and_then(Weak::upgrade)
            .is_some_and(|existing| existing.is_alive());
        if live {
            return Err(SerialError::PortInUse(service.port.clone()));
        }
        ports.insert(service.port.clone(), Arc::downgrade(service));
        Ok(())
    }

    fn release(&self, service: &SerialService) {
        let mut ports = self.ports.write();
        let owned = ports
            .get(&service.port)
            .is_some_and(|existing| std::ptr::eq(existing.as_ptr(), service));
        if owned {
            ports.remove(&service.port);
        }
    }
}

impl fmt::Debug for PortDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortDirectory").field("ports", &self.ports()).finish()
    }
}

struct WriteJob {
    data: Bytes,
    done: oneshot::Sender<io::Result<()>>,
}

/// One open modem port.
///
/// Inbound chunks are published as [`Event::DataReceived`] in arrival order
/// by a dedicated dispatcher task, so the reader never waits on handlers.
/// [`Event::WriteRequest`] events for this port are written out and
/// acknowledged with [`Event::DataSent`].
pub struct SerialService {
    port: String,
    alive: AtomicBool,
    bus: EventBus,
    directory: PortDirectory,
    writer: Mutex<Option<mpsc::UnboundedSender<WriteJob>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    write_handler: Mutex<Option<HandlerId>>,
}

impl SerialService {
    /// Start serving `stream` as `config.port`.
    ///
    /// Fails with [`SerialError::PortInUse`] while another live service in
    /// `directory` owns the same port.
    pub fn spawn<S>(
        bus: &EventBus,
        directory: &PortDirectory,
        config: &SerialConfig,
        stream: S,
    ) -> SerialResult<Arc<Self>>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let service = Arc::new(SerialService {
            port: config.port.clone(),
            alive: AtomicBool::new(true),
            bus: bus.clone(),
            directory: directory.clone(),
            writer: Mutex::new(Some(write_tx)),
            tasks: Mutex::new(Vec::new()),
            write_handler: Mutex::new(None),
        });
        directory.claim(&service)?;

        let owner = Arc::downgrade(&service);
        let handler = bus.register_event_handler(
            &[EventParam::required("request", EventKind::WriteRequest)],
            move |binding: Binding| forward_write(owner.clone(), binding),
        );
        let handler = match handler {
            Ok(id) => id,
            Err(e) => {
                service.unregister();
                return Err(e.into());
            }
        };
        *service.write_handler.lock() = Some(handler);

        let (reader, writer) = connection::split(stream, config.read_buffer_capacity);
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let tasks = vec![
            tokio::spawn(read_loop(
                service.port.clone(),
                directory.clone(),
                reader,
                chunk_tx,
            )),
            tokio::spawn(dispatch_loop(service.port.clone(), bus.clone(), chunk_rx)),
            tokio::spawn(write_loop(service.port.clone(), writer, write_rx)),
        ];
        service.tasks.lock().extend(tasks);

        debug!(port = %service.port, "serial service started");
        Ok(service)
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Write `data` to the device, then publish [`Event::DataSent`].
    pub async fn write(&self, data: Bytes) -> SerialResult<()> {
        let closed = || SerialError::Closed(self.port.clone());
        if !self.is_alive() {
            return Err(closed());
        }

        let sender = self.writer.lock().clone().ok_or_else(closed)?;
        let (done, written) = oneshot::channel();
        sender
            .send(WriteJob {
                data: data.clone(),
                done,
            })
            .map_err(|_| closed())?;
        written.await.map_err(|_| closed())??;

        trace!(port = %self.port, bytes = data.len(), "written");
        self.bus.send(Event::data_sent(self.port.clone(), data)).await?;
        Ok(())
    }
}

impl Service for SerialService {
    fn unregister(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }

        self.writer.lock().take();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(id) = self.write_handler.lock().take() {
            if let Err(e) = self.bus.unregister_event_handler(id) {
                warn!(port = %self.port, error = %e, "write handler already gone");
            }
        }
        self.directory.release(self);
        debug!(port = %self.port, "serial service stopped");
    }
}

impl fmt::Debug for SerialService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialService")
            .field("port", &self.port)
            .field("alive", &self.is_alive())
            .finish()
    }
}

async fn forward_write(owner: Weak<SerialService>, binding: Binding) -> crate::Result<()> {
    let Some(service) = owner.upgrade() else {
        return Ok(());
    };
    let Some(request) = binding.get("request").and_then(Event::as_serial) else {
        return Ok(());
    };
    if request.port != service.port || !service.is_alive() {
        return Ok(());
    }

    service.write(request.data.clone()).await?;
    Ok(())
}

async fn read_loop<R>(
    port: String,
    directory: PortDirectory,
    mut reader: ReadConnection<R>,
    chunks: mpsc::UnboundedSender<Bytes>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let chunk = match reader.read_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                debug!(port = %port, "serial stream closed");
                break;
            }
            Err(e) => {
                warn!(port = %port, error = %e, "serial read failed");
                break;
            }
        };

        if directory.lookup(&port).is_none() {
            break;
        }
        if chunks.send(chunk).is_err() {
            break;
        }
    }
}

async fn dispatch_loop(port: String, bus: EventBus, mut chunks: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(chunk) = chunks.recv().await {
        if let Err(e) = bus.send(Event::data_received(port.clone(), chunk)).await {
            warn!(port = %port, error = %e, "DataReceived handler failed");
        }
    }
}

async fn write_loop<W>(port: String, mut writer: WriteConnection<W>, mut jobs: mpsc::UnboundedReceiver<WriteJob>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(job) = jobs.recv().await {
        let result = writer.write_chunk(&job.data).await;
        let failed = result.is_err();
        let _ = job.done.send(result);
        if failed {
            warn!(port = %port, "serial writer stopped after failed write");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

enum PortSource {
    Device,
    Stream(Mutex<Option<DuplexStream>>),
}

/// Opens the configured ports and registers each as a service under `serial`.
///
/// The node also holds the module's [`PortDirectory`] as `serial.ports`.
#[derive(Default)]
pub struct SerialModule {
    directory: PortDirectory,
    ports: Vec<(SerialConfig, PortSource)>,
}

impl SerialModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a physical device on every apply.
    pub fn with_port(mut self, config: SerialConfig) -> Self {
        self.ports.push((config, PortSource::Device));
        self
    }

    /// Serve an already open stream. It is consumed by the first apply.
    pub fn with_stream(mut self, config: SerialConfig, stream: DuplexStream) -> Self {
        self.ports
            .push((config, PortSource::Stream(Mutex::new(Some(stream)))));
        self
    }

    pub fn directory(&self) -> &PortDirectory {
        &self.directory
    }
}

impl Module for SerialModule {
    fn name(&self) -> &str {
        "serial"
    }

    fn apply(&self, ctx: &Arc<Context>) -> crate::Result<()> {
        let node = ctx.register_node("serial")?;
        node.register_value("ports", self.directory.clone())?;

        for (config, source) in &self.ports {
            let stream = match source {
                PortSource::Device => open_port(config)?,
                PortSource::Stream(stream) => stream
                    .lock()
                    .take()
                    .ok_or_else(|| SerialError::Closed(config.port.clone()))?,
            };
            let service = SerialService::spawn(ctx.bus(), &self.directory, config, stream)?;
            if let Err(e) = node.register_service(&config.port, Arc::clone(&service)) {
                service.unregister();
                return Err(e.into());
            }
        }
        Ok(())
    }
}
