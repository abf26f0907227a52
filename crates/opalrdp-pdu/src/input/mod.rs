//! Client-to-server input events (FastPath only; the slow-path input PDU is
//! never emitted by this client).

pub mod fast_path;
pub mod mouse;

pub use self::fast_path::{FastPathInput, FastPathInputEvent, FastPathInputHeader, KeyboardFlags, SynchronizeFlags};
pub use self::mouse::{MousePdu, MouseXPdu, PointerFlags, PointerXFlags};
