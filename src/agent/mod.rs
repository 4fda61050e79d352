//! TCP configuration agent.
//!
//! - [`receiver`] reassembles framed messages from arbitrary stream chunks
//! - [`dispatch`] executes a complete message against the board
//! - [`session`] drives one connection
//! - [`server`] accepts connections, one at a time

pub mod dispatch;
pub mod receiver;
pub mod server;
pub mod session;

pub use dispatch::{Dispatch, Dispatcher, Outcome};
pub use receiver::{FrameReceiver, RxState};
pub use server::ConnectionServer;
pub use session::{run_session, SessionConfig, SessionSummary};
