// camctl-api: Async Rust client for a network camera's control plane and event stream

mod ctrl;
pub mod error;
pub mod models;
pub mod session;
pub mod stream;
pub mod transport;

pub use error::Error;
pub use models::{ModeAction, StatusReply};
pub use session::{RequestOptions, Session, SessionClient};
pub use stream::{DeviceFrame, FrameKind};
pub use transport::DeviceEndpoint;
