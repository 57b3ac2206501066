pub mod peer;
pub mod registry;
pub mod room;
pub mod sfu;
pub mod worker_pool;

pub use peer::{AppType, Peer, PeerIdentity};
pub use registry::RoomRegistry;
pub use room::{Direction, Room, RoomError};
pub use sfu::SfuError;
pub use worker_pool::WorkerPool;
