// camctl-core: Control arbitration and live event subscriptions on top of camctl-api.

pub mod config;
pub mod control;
pub mod error;
pub mod model;
pub mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControlConfig, SubscriptionConfig};
pub use control::{ControlManager, ControlStatus};
pub use error::CoreError;
pub use subscription::{
    ContextSink, SubscriptionEvent, SubscriptionEventStream, SubscriptionFilter,
    SubscriptionManager,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ConnectionStatistics, ConnectionStatus, ContextUpdate, ControlMode, ControlState,
    InboundMessage, LinkState, MessageKind, PtzPosition,
};
