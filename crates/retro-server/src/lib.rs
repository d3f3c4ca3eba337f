pub mod client;
pub mod error;
pub mod room;
pub mod router;
pub mod server;

pub use error::RoomError;
pub use room::{RoomCoordinator, RoomEvent};
pub use router::RoomRouter;
pub use server::{start, ServerConfig, ServerHandle};
