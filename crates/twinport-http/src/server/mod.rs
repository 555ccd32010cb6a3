pub mod application;
pub mod dispatcher;
pub mod lifecycle;
pub mod server;

pub use application::Application;
pub use dispatcher::Dispatcher;
pub use lifecycle::shutdown_signal;
pub use server::{BoundServer, Server};
