// Background poll scheduler.

mod interface;
mod poller;
mod refresh;
mod scheduler;
pub mod stub;

pub use interface::{Engine, EngineHandle, Event, Request};
pub use scheduler::{PollScheduler, PollSettings};
pub use stub::StubSearchApi;
