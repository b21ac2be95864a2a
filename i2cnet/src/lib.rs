//! Use an I2C/SMBus bus attached to another machine as if it were local.
//!
//! `i2cnet` exposes the [`SmBus`] trait, the call surface of a local SMBus
//! handle, and several implementations of it:
//!
//! - [`RemoteBus`] forwards every call over TCP to an `i2cnet-server`
//!   process that owns the physical bus;
//! - [`LinuxBus`] drives a local `/dev/i2c-N` (Linux only);
//! - [`MockBus`] simulates register-file devices in memory.
//!
//! Code written against [`SmBus`] runs unchanged on any of them.
//!
//! # Quick start
//!
//! ```no_run
//! use i2cnet::{RemoteBus, SmBus};
//!
//! let mut bus = RemoteBus::connect("192.168.1.200", 8888)?;
//! for address in bus.scan()? {
//!     println!("found device at {address:#04x}");
//! }
//! bus.write_byte_data(0x68, 0x6B, 0x00)?;
//! let who_am_i = bus.read_byte_data(0x68, 0x75)?;
//! # let _ = who_am_i;
//! # Ok::<(), i2cnet::Error>(())
//! ```

mod bus;
mod client;
mod config;
mod error;
#[cfg(target_os = "linux")]
mod linux;
mod mock;
pub mod scan;
mod session;

pub use bus::SmBus;
pub use client::RemoteBus;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use i2cnet_proto::{BusOperation, BusResponse, DEFAULT_PORT, MAX_BLOCK, Status};
#[cfg(target_os = "linux")]
pub use linux::LinuxBus;
pub use mock::MockBus;
pub use scan::Probe;
pub use session::{Session, SessionState};
