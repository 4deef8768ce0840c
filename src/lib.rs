//! Ground-station gateway between TCP ground equipment and a satellite
//! operations platform.
//!
//! Each configured data channel listens for TCP connections carrying
//! length-prefixed frames. When a scheduled pass reaches AOS the gateway
//! opens a platform stream for it and relays frames both ways until LOS.
//!
//! # Features
//!
//! - **Deadline-driven passes**: AOS/LOS are absolute deadlines; nothing is
//!   sent to the platform outside a pass window
//! - **Failure isolation**: a bad frame closes one connection, a failed
//!   stream skips one pass, a busy port disables one channel
//! - **Graceful shutdown**: one cancellation tree from the gateway down to
//!   every connection, with `wait()` as a completion barrier
//!
//! ## Example
//!
//! ```rust,no_run
//! use groundgate::{Config, GatewaySupervisor, OfflinePlatform, PlanWatcher};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("gateway.yaml")?;
//!     let platform = Arc::new(OfflinePlatform::from_schedule_file("schedule.yaml")?);
//!
//!     let gateway = Arc::new(GatewaySupervisor::start(&config.data, platform.clone()).await?);
//!     let watcher = PlanWatcher::start(
//!         platform,
//!         gateway.clone(),
//!         config.ground_station.plan_update_interval(),
//!         &gateway.shutdown_token(),
//!     );
//!
//!     tokio::signal::ctrl_c().await?;
//!     gateway.stop();
//!     watcher.wait().await;
//!     gateway.wait().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(test)]
mod test_utils;
pub mod types;

// Wire and configuration
pub mod codec;
pub mod config;

// Runtime components
pub mod bridge;
pub mod platform;
pub mod session;
pub mod supervisor;
pub mod watcher;

pub use error::*;
pub use types::*;

pub use bridge::{BridgePort, ConnectionBridge, InboundBinding, OutboundBinding};
pub use codec::FrameCodec;
pub use config::{Config, DataChannelConfig, GroundStationConfig, SchedulerConfig};
pub use platform::{OfflinePlatform, PlanStream, PlatformClient};
pub use session::{EndReason, PassHandle, PassReport, PassSession, PassState, PassStats};
pub use supervisor::{DataChannelSupervisor, GatewaySupervisor};
pub use watcher::{PlanListener, PlanWatcher};
