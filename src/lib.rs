//! Rust library for controlling Marantz and Denon AV receivers
//!
//! This library drives the receivers' line-oriented control protocol
//! (`PWON`, `MV45`, `SIBD`, ...) over TCP or any transport you supply. It supports:
//!
//! - Power, mute and master volume, with press-and-hold volume ramping
//! - Input and surround mode selection
//! - Per-channel level trims for every speaker position the device reports
//! - Zone 2 power, mute, volume and source
//! - Value-changed notifications for every observable field
//! - Link health monitoring and periodic status polling
//!
//! # Quick Start
//!
//! ```no_run
//! use marantz_avr::{AvReceiver, Feedback, ReceiverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let receiver = AvReceiver::connect("192.168.1.50", 23, ReceiverConfig::default()).await?;
//!
//!     receiver.power_on()?;
//!     receiver.select_input("BD")?;
//!
//!     // Hold volume up for half a second
//!     receiver.volume_up(true);
//!     tokio::time::sleep(std::time::Duration::from_millis(500)).await;
//!     receiver.volume_up(false);
//!
//!     let mut feedback = receiver.subscribe();
//!     while let Ok(update) = feedback.recv().await {
//!         if let Feedback::Volume { level, .. } = update {
//!             println!("Volume is now {}", level);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Custom Transport
//!
//! Anything that can write text can carry the protocol. Implement
//! [`Transport`] and push each received line through [`LineSender`]:
//!
//! ```no_run
//! use marantz_avr::{AvReceiver, ReceiverConfig, Result, Transport};
//! use std::sync::Arc;
//!
//! struct SerialPort;
//!
//! impl Transport for SerialPort {
//!     fn send(&self, text: &str) -> Result<()> {
//!         // write `text` (already CR-terminated) to the port
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let receiver = AvReceiver::new(ReceiverConfig::default(), Arc::new(SerialPort))?;
//!     let lines = receiver.line_sender();
//!     lines.push("PWON")?;
//!     receiver.set_link_health(true);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Receiver**: High-level control API and device model
//! - **Queue / Reconciler**: Ordered application of received lines
//! - **Parser / Protocol**: Classifying responses and encoding commands
//! - **Ramp**: Press-and-hold stepping for volume-like values
//! - **Transport / Monitor / Poll**: Link, health and status refresh

mod channels;
mod config;
mod error;
mod feedback;
mod monitor;
mod parser;
mod poll;
pub mod protocol;
mod queue;
mod ramp;
mod receiver;
mod reconciler;
mod selection;
mod state;
mod transport;
mod types;
mod zone2;

// Public exports
pub use channels::ChannelRegistry;
pub use config::{ControlConfig, MonitorConfig, ReceiverConfig, DEFAULT_PORT};
pub use error::{AvrError, Result};
pub use feedback::{Feedback, FeedbackReceiver, Zone2Feedback};
pub use monitor::MonitorStatus;
pub use parser::{parse_line, parse_zone2, Response, Zone2Response};
pub use protocol::Generation;
pub use queue::LineSender;
pub use ramp::{Direction, RampState};
pub use receiver::AvReceiver;
pub use selection::SelectableItem;
pub use state::DeviceSnapshot;
pub use transport::{TcpTransport, Transport};
pub use types::{
    validate_tables, ChannelVolume, InputDef, Level, NormalizedLevel, SurroundChannel,
    SurroundMode, SurroundModeDef, MAIN_INPUT_TABLE, SURROUND_MODE_TABLE, ZONE2_INPUT_TABLE,
};
pub use zone2::{Zone2, Zone2Snapshot};
