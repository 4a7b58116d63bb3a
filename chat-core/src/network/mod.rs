pub mod connection;
pub mod handler;

pub use connection::{ConnectionInfo, SocketConnection, WeakConnection};
pub use handler::{ConnectionHandler, LoggingHandler};
