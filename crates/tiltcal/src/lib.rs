//! Calibration runtime: device channel, session state machine, persisted
//! parameters and result reports.

pub mod channel;
pub mod config;
pub mod params;
pub mod report;
pub mod session;

pub use channel::{CommandChannel, Timeouts, Transport, TransportError};
pub use config::Config;
pub use report::SessionReport;
pub use session::{Session, SessionError, SessionSettings, SessionState};
