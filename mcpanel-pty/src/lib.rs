mod errors;
mod pipe;
mod session;
mod size;
mod unix;

pub use crate::errors::SessionError;
pub use crate::pipe::{PipePeer, PipeSession, pipe};
pub use crate::session::{Pollable, PollableSession, Session};
pub use crate::size::PtySize;
pub use crate::unix::{UnixSession, UnixSessionBuilder, unix};
