//! levelpilot: multi-account leveling supervisor.
//!
//! Each registered account runs at most one background loop that
//! submits work to a gateway, waits out a cycle, polls the gained XP
//! and accumulates progress toward an optional target level. The
//! supervisor owns the loops; an HTTP JSON API drives it.

pub mod account;
pub mod config;
pub mod error;
pub mod gateway;
pub mod progress;
pub mod server;
pub mod supervisor;

pub use account::{Account, AccountSnapshot, AccountStore};
pub use config::{Config, GatewayConfig, GatewayMode, SupervisorConfig};
pub use error::{AccountError, GatewayError};
pub use gateway::{GatewayClient, MockGateway, RemoteGateway, WorkOutcome, create_gateway};
pub use supervisor::{StartOutcome, TaskSupervisor};
