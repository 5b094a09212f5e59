//! Reader and processor threads connecting an adapter to the metric table and the DTC channel.
//!
//! A [`Bus`] moves through Idle, Running and Stopped. Once stopped it cannot be restarted, the hardware handle is
//! closed when the reader thread exits.

pub mod interface;

pub use interface::{BusInterface, J1939Interface, SerialInterface};

use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::adapter::{J1939Adapter, SerialAdapter};
use crate::config::BusConfig;
use crate::decoder::Decoder;
use crate::dtc::{DtcRecord, DtcStore};
use crate::error::Error;
use crate::j1587::J1587Decoder;
use crate::j1939::J1939Decoder;
use crate::metrics::{MetricSnapshot, MetricTable};
use crate::Result;

const COMMAND_BUFFER_SIZE: usize = 8;

type Request<T> = (T, oneshot::Sender<Result<()>>);

struct Pipeline<T> {
    cancel: CancellationToken,
    command_sender: mpsc::Sender<Request<T>>,
    reader: JoinHandle<()>,
    processor: JoinHandle<()>,
}

impl<T> Pipeline<T> {
    fn shutdown(self) {
        self.cancel.cancel();

        // The reader drops the frame sender on exit, the processor then drains what is left
        if self.reader.join().is_err() {
            error!("Reader thread panicked");
        }
        if self.processor.join().is_err() {
            error!("Processor thread panicked");
        }
    }
}

enum State<I: BusInterface, D> {
    Idle {
        interface: Option<I>,
        decoder: D,
        dtc_sender: mpsc::Sender<DtcRecord>,
    },
    Running(Pipeline<I::Outbound>),
    Stopped,
}

/// A single bus: one interface, one decoder, one metric table and one DTC channel.
pub struct Bus<I: BusInterface, D: Decoder<Frame = I::Frame>> {
    config: BusConfig,
    metrics: Arc<MetricTable>,
    store: Arc<dyn DtcStore>,
    dtc_receiver: Option<mpsc::Receiver<DtcRecord>>,
    state: State<I, D>,
}

pub type J1587Bus = Bus<SerialInterface, J1587Decoder>;
pub type J1939Bus = Bus<J1939Interface, J1939Decoder>;

impl J1587Bus {
    pub fn j1587(
        adapter: impl SerialAdapter + 'static,
        store: Arc<dyn DtcStore>,
        config: BusConfig,
    ) -> Self {
        let interface = SerialInterface::new(adapter, config.inter_frame_gap);
        Bus::new(Some(interface), J1587Decoder::new(), store, config)
    }
}

impl J1939Bus {
    pub fn j1939(
        adapter: impl J1939Adapter + 'static,
        store: Arc<dyn DtcStore>,
        config: BusConfig,
    ) -> Self {
        Bus::new(Some(J1939Interface::new(adapter)), J1939Decoder::new(), store, config)
    }
}

impl<I: BusInterface, D: Decoder<Frame = I::Frame>> Bus<I, D> {
    /// Create an idle bus. Without an interface, [`Bus::start`] fails with [`Error::NotOpen`]
    /// until one is attached.
    pub fn new(
        interface: Option<I>,
        decoder: D,
        store: Arc<dyn DtcStore>,
        config: BusConfig,
    ) -> Self {
        let (dtc_sender, dtc_receiver) = mpsc::channel(config.dtc_buffer_size.max(1));

        Self {
            config,
            metrics: Arc::new(MetricTable::new()),
            store,
            dtc_receiver: Some(dtc_receiver),
            state: State::Idle {
                interface,
                decoder,
                dtc_sender,
            },
        }
    }

    /// Provide the interface of an idle bus.
    pub fn attach(&mut self, interface: I) -> Result<()> {
        match &mut self.state {
            State::Idle { interface: slot, .. } => {
                *slot = Some(interface);
                Ok(())
            }
            State::Running(_) => Err(Error::AlreadyRunning),
            State::Stopped => Err(Error::Stopped),
        }
    }

    /// Spawn the reader and processor threads.
    pub fn start(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, State::Stopped);
        let (interface, decoder, dtc_sender) = match state {
            State::Idle {
                interface: Some(interface),
                decoder,
                dtc_sender,
            } => (interface, decoder, dtc_sender),
            State::Idle {
                interface: None,
                decoder,
                dtc_sender,
            } => {
                self.state = State::Idle {
                    interface: None,
                    decoder,
                    dtc_sender,
                };
                return Err(Error::NotOpen);
            }
            State::Running(pipeline) => {
                self.state = State::Running(pipeline);
                return Err(Error::AlreadyRunning);
            }
            State::Stopped => return Err(Error::Stopped),
        };

        let cancel = CancellationToken::new();
        let (frame_sender, frame_receiver) = mpsc::channel(self.config.frame_buffer_size.max(1));
        let (command_sender, command_receiver) = mpsc::channel(COMMAND_BUFFER_SIZE);

        let reader = {
            let cancel = cancel.clone();
            let read_timeout = self.config.read_timeout;
            std::thread::spawn(move || {
                read_frames(interface, frame_sender, command_receiver, cancel, read_timeout)
            })
        };

        let processor = {
            let cancel = cancel.clone();
            let metrics = self.metrics.clone();
            let store = self.store.clone();
            std::thread::spawn(move || {
                process_frames(decoder, frame_receiver, metrics, store, dtc_sender, cancel)
            })
        };

        self.state = State::Running(Pipeline {
            cancel,
            command_sender,
            reader,
            processor,
        });

        info!("Bus started");
        Ok(())
    }

    /// Cancel both threads and wait for them to exit.
    /// Stopping a bus that is not running has no effect.
    pub fn stop(&mut self) {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running(pipeline) => {
                pipeline.shutdown();
                info!("Bus stopped");
            }
            idle @ State::Idle { .. } => self.state = idle,
            State::Stopped => {}
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, State::Stopped)
    }

    /// Queue `message` for the reader thread. The future resolves once the adapter write returned.
    pub fn send(&self, message: I::Outbound) -> impl Future<Output = Result<()>> + Send + 'static {
        let command_sender = match &self.state {
            State::Running(pipeline) => Some(pipeline.command_sender.clone()),
            _ => None,
        };

        async move {
            let command_sender = command_sender.ok_or(Error::NotRunning)?;
            let (callback_sender, callback_receiver) = oneshot::channel();

            command_sender
                .send((message, callback_sender))
                .await
                .map_err(|_| Error::NotRunning)?;

            callback_receiver.await.map_err(|_| Error::NotRunning)?
        }
    }

    /// Ask `target` (or the default module) to clear its active DTCs, then forget every DTC seen
    /// so far.
    pub fn clear_active_dtcs(
        &self,
        target: Option<u8>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let target = target.unwrap_or(I::DEFAULT_TARGET);
        let request = self.send(I::clear_dtcs_request(target));
        let store = self.store.clone();

        async move {
            request.await?;
            store.clear_all()?;
            info!("Cleared active DTCs of {}", target);
            Ok(())
        }
    }

    pub fn metrics(&self) -> Arc<MetricTable> {
        self.metrics.clone()
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.metrics.snapshot()
    }

    pub fn store(&self) -> Arc<dyn DtcStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Receiver of newly detected DTCs. Can only be taken once.
    pub fn take_dtc_receiver(&mut self) -> Option<mpsc::Receiver<DtcRecord>> {
        self.dtc_receiver.take()
    }

    /// Newly detected DTCs as a [`tokio_stream::Stream`]. Can only be taken once.
    pub fn dtc_stream(&mut self) -> Option<ReceiverStream<DtcRecord>> {
        self.take_dtc_receiver().map(ReceiverStream::new)
    }
}

impl<I: BusInterface, D: Decoder<Frame = I::Frame>> Drop for Bus<I, D> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_frames<I: BusInterface>(
    mut interface: I,
    frame_sender: mpsc::Sender<I::Frame>,
    mut command_receiver: mpsc::Receiver<Request<I::Outbound>>,
    cancel: CancellationToken,
    read_timeout: Duration,
) {
    let mut frames = Vec::new();

    while !cancel.is_cancelled() {
        if let Err(e) = interface.poll(&mut frames) {
            warn!("Read failed: {}", e);
            std::thread::sleep(read_timeout);
        }

        for frame in frames.drain(..) {
            match frame_sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    warn!("Frame channel full, dropping {:?}", frame)
                }
                Err(TrySendError::Closed(_)) => {
                    if !cancel.is_cancelled() {
                        warn!("Processor exited, stopping reader");
                    }
                    return;
                }
            }
        }

        while let Ok((message, callback)) = command_receiver.try_recv() {
            debug!("TX {:?}", message);
            let result = interface.write(&message);
            if let Err(e) = &result {
                warn!("Write of {:?} failed: {}", message, e);
            }
            let _ = callback.send(result);
        }
    }

    debug!("Reader exiting");
}

fn process_frames<D: Decoder>(
    decoder: D,
    mut frame_receiver: mpsc::Receiver<D::Frame>,
    metrics: Arc<MetricTable>,
    store: Arc<dyn DtcStore>,
    dtc_sender: mpsc::Sender<DtcRecord>,
    cancel: CancellationToken,
) {
    while let Some(frame) = frame_receiver.blocking_recv() {
        let dtcs = match decoder.decode(&frame, &metrics) {
            Ok(dtcs) => dtcs,
            Err(e) => {
                warn!("Dropping {:?}: {}", frame, e);
                continue;
            }
        };

        for dtc in dtcs {
            let is_new = store.is_new(dtc.code, dtc.fmi).unwrap_or_else(|e| {
                error!("DTC store failed, forwarding {}:{} as new: {}", dtc.code, dtc.fmi, e);
                true
            });
            if !is_new {
                trace!("Known DTC {}:{}", dtc.code, dtc.fmi);
                continue;
            }

            info!("New DTC {}", dtc.description);
            let dropped = match dtc_sender.try_send(dtc) {
                Ok(()) => continue,
                Err(TrySendError::Full(dtc)) => {
                    warn!("DTC channel full, dropping {}", dtc.description);
                    dtc
                }
                Err(TrySendError::Closed(dtc)) => {
                    if !cancel.is_cancelled() {
                        debug!("DTC receiver dropped");
                    }
                    dtc
                }
            };

            // Undelivered codes must be reported again on their next sighting
            if let Err(e) = store.remove(dropped.code, dropped.fmi) {
                error!("Failed to forget dropped DTC {}:{}: {}", dropped.code, dropped.fmi, e);
            }
        }
    }

    debug!("Processor exiting");
}
