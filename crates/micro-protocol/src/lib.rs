//! micro protocol types.
//!
//! Shared vocabulary for every other crate in the workspace: the naming
//! rules for `service/logic/function` segments, the canonical call payload,
//! the `{success, data}` envelope, error kinds, and the native contexts a
//! handler receives when it takes over response writing.

pub mod context;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod names;
pub mod payload;
pub mod reply;

pub use context::{HttpContext, NativeContext, PendingResponse, ResponseHead, ResponseWriter, SocketContext};
pub use envelope::{Envelope, ErrorBody};
pub use error::{CallError, ContextClosed, ErrorKind};
pub use frame::SocketFrame;
pub use names::{DeclaredName, Visibility, is_valid_segment, parse_declared};
pub use payload::{CallPayload, CallTarget, Origin};
pub use reply::{CallResult, Reply, TakeOver};
