// Command model and the dispatcher that runs commands against devices

pub mod command;
pub mod dispatcher;

pub use command::{Command, Direction, Payload, Targets};
pub use dispatcher::Dispatcher;
