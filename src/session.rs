//! Protocol selection: one running [`Bus`](crate::bus::Bus) behind a single handle, driven by configuration.
//! ## Example:
//! ```rust,no_run
//! use hdbus::config::BusConfig;
//! use hdbus::session::{Command, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> hdbus::Result<()> {
//!     let mut session = Session::open(&SessionConfig::default(), BusConfig::default())?;
//!     let mut dtcs = session.take_dtc_receiver().unwrap();
//!     session.start()?;
//!
//!     while let Some(dtc) = dtcs.recv().await {
//!         println!("{}", dtc.to_json().unwrap());
//!         session.execute(Command::ClearActiveDtcs { target: None }).await?;
//!     }
//!     Ok(())
//! }
//! ```
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::{J1587Bus, J1939Bus};
use crate::config::{BusConfig, DEFAULT_BAUD_RATE};
use crate::dtc::{DtcRecord, DtcStore, MemoryStore, Protocol, SledStore};
use crate::metrics::{MetricSnapshot, MetricTable};
use crate::Result;

/// Completion of a [`Command`]. Independent of the session that issued it.
pub type CommandFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Serial port carrying the J1708 link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_owned(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// CAN interface with the kernel J1939 stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct J1939Config {
    pub interface: String,
    /// Local source address. Without one the socket only receives.
    #[serde(default)]
    pub source_address: Option<u8>,
}

impl Default for J1939Config {
    fn default() -> Self {
        Self {
            interface: "can0".to_owned(),
            source_address: None,
        }
    }
}

/// Which bus to open and how to reach the hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum SessionConfig {
    J1587(SerialConfig),
    J1939(J1939Config),
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::J1939(J1939Config::default())
    }
}

/// Operator command, as received from the command intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Clear the active DTCs of `target` (MID for J1587, address for J1939), or of engine #1.
    #[serde(rename = "clear_dtcs")]
    ClearActiveDtcs {
        #[serde(default)]
        target: Option<u8>,
    },
}

/// A bus of either protocol.
pub enum Session {
    J1587(J1587Bus),
    J1939(J1939Bus),
}

fn open_store(config: &BusConfig) -> Result<Arc<dyn DtcStore>> {
    match &config.store_path {
        Some(path) => Ok(Arc::new(SledStore::open(path)?)),
        None => {
            warn!("No DTC store path configured, deduplication will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

impl Session {
    /// Open the store and the adapter selected by `session`. The returned session is idle.
    pub fn open(session: &SessionConfig, config: BusConfig) -> Result<Self> {
        let store = open_store(&config)?;

        match session {
            #[cfg(feature = "serial")]
            SessionConfig::J1587(serial) => {
                let adapter = crate::serial::SerialPortAdapter::open(
                    &serial.port,
                    serial.baud_rate,
                    config.read_timeout,
                )?;
                Ok(Session::J1587(J1587Bus::j1587(adapter, store, config)))
            }
            #[cfg(all(target_os = "linux", feature = "socketcan"))]
            SessionConfig::J1939(can) => {
                let adapter = crate::socketcan::SocketCan::open(
                    &can.interface,
                    can.source_address,
                    config.read_timeout,
                )?;
                Ok(Session::J1939(J1939Bus::j1939(adapter, store, config)))
            }
            #[allow(unreachable_patterns)]
            _ => {
                drop(store);
                Err(crate::Error::Unsupported)
            }
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Session::J1587(_) => Protocol::J1587,
            Session::J1939(_) => Protocol::J1939,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        match self {
            Session::J1587(bus) => bus.start(),
            Session::J1939(bus) => bus.start(),
        }
    }

    pub fn stop(&mut self) {
        match self {
            Session::J1587(bus) => bus.stop(),
            Session::J1939(bus) => bus.stop(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Session::J1587(bus) => bus.is_running(),
            Session::J1939(bus) => bus.is_running(),
        }
    }

    pub fn metrics(&self) -> Arc<MetricTable> {
        match self {
            Session::J1587(bus) => bus.metrics(),
            Session::J1939(bus) => bus.metrics(),
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.metrics().snapshot()
    }

    pub fn take_dtc_receiver(&mut self) -> Option<mpsc::Receiver<DtcRecord>> {
        match self {
            Session::J1587(bus) => bus.take_dtc_receiver(),
            Session::J1939(bus) => bus.take_dtc_receiver(),
        }
    }

    /// Run an operator command against the bus. The returned future does not borrow the session.
    pub fn execute(&self, command: Command) -> CommandFuture {
        info!("Executing {:?} on {}", command, self.protocol());

        match (self, command) {
            (Session::J1587(bus), Command::ClearActiveDtcs { target }) => {
                Box::pin(bus.clear_active_dtcs(target))
            }
            (Session::J1939(bus), Command::ClearActiveDtcs { target }) => {
                Box::pin(bus.clear_active_dtcs(target))
            }
        }
    }
}

impl From<J1587Bus> for Session {
    fn from(bus: J1587Bus) -> Self {
        Session::J1587(bus)
    }
}

impl From<J1939Bus> for Session {
    fn from(bus: J1939Bus) -> Self {
        Session::J1939(bus)
    }
}
