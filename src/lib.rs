//! # The hdbus Crate
//! Decodes the diagnostic buses of heavy-duty vehicles into a live metric table and a stream of newly detected
//! Diagnostic Trouble Codes (DTCs). Two protocols are supported: SAE J1587 on the J1708 serial link, and SAE J1939 on
//! CAN through the Linux kernel J1939 stack.
//!
//! Each bus runs a reader thread that owns the hardware handle and a processor thread that decodes frames. Metrics are
//! last-write-wins, DTCs are deduplicated against a persistent store before they are forwarded.
//!
//! ## J1939 Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdbus::bus::J1939Bus;
//! use hdbus::config::BusConfig;
//! use hdbus::dtc::SledStore;
//! use hdbus::socketcan::SocketCan;
//!
//! async fn j1939_example() -> hdbus::Result<()> {
//!     let config = BusConfig::default();
//!     let adapter = SocketCan::open("can0", None, config.read_timeout)?;
//!     let store = Arc::new(SledStore::open("/var/lib/hdbus/dtc")?);
//!
//!     let mut bus = J1939Bus::j1939(adapter, store, config);
//!     let mut dtcs = bus.take_dtc_receiver().unwrap();
//!     bus.start()?;
//!
//!     while let Some(dtc) = dtcs.recv().await {
//!         println!("{} {}", dtc.description, bus.snapshot().to_json().unwrap());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported adapters
//!  - Serial J1708 transceivers (all platforms, using [tokio-serial](https://github.com/berkowski/tokio-serial))
//!  - SocketCAN J1939 (Linux only)
//!

pub mod adapter;
pub mod bus;
pub mod config;
pub mod decoder;
pub mod dtc;
mod error;
pub mod j1587;
pub mod j1939;
pub mod metrics;
pub mod session;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;
