// ── Domain model ──
//
// Value types shared by the control and subscription managers.

pub mod connection;
pub mod context;
pub mod message;
pub mod mode;

pub use connection::{ConnectionStatistics, ConnectionStatus, LinkState};
pub use context::{ContextUpdate, PtzPosition};
pub use message::{InboundMessage, MessageKind};
pub use mode::{ControlMode, ControlState};
