//! SSTP Common Library
//!
//! Shared functionality for the SSTP client including:
//! - Frame and attribute codec
//! - Control-channel state machine
//! - Crypto binding (MS-CHAPv2 derived Compound MAC)
//! - Passive PPP/CHAP frame inspection

pub mod crypto;
pub mod error;
pub mod frame;
pub mod machine;
pub mod ppp;
pub mod proto;

pub use frame::{ControlFrame, Frame};
pub use machine::{Action, ClientState, Event, Machine};
pub use proto::MessageType;

/// Common result type for SSTP operations
pub type Result<T> = anyhow::Result<T>;
