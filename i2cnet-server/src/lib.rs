//! Serves a local I2C/SMBus bus to remote [`i2cnet`] clients.
//!
//! The [`Gateway`] owns the physical bus and admits one hardware transaction
//! at a time. The [`Server`] accepts TCP connections, runs one task per
//! connection, and funnels every decoded request through the gateway.

mod config;
mod gateway;
mod server;

pub use config::ServerConfig;
pub use gateway::Gateway;
pub use server::Server;
