mod handler;
mod player;
mod protocol;
mod registry;
mod scheduler;
mod session;

pub use handler::*;
pub use player::*;
pub use protocol::*;
pub use registry::*;
pub use scheduler::*;
pub use session::*;
