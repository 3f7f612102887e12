//! Stream relay: forwards upstream fragments to a client as ordered frames.
//!
//! A session sends `start`, one `chunk` per fragment, then exactly one of
//! `done` (upstream exhausted) or `error` (upstream failed). When the client
//! disconnects the upstream is cancelled and nothing more is written. Cancelling
//! the parent token given to [`StreamRelay::shutdown_on`] ends the session with
//! an `error` frame.

mod forwarder;
mod frame;
mod session;
mod sink;


pub use forwarder::{AbortReason, RelayOutcome, StreamRelay};
pub use frame::Frame;
pub use session::{RelaySession, RelayState};
pub use sink::{ClientGone, FrameSink};
