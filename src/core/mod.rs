pub mod bus;
pub mod query;
pub mod replies;
pub mod runner;
pub mod session;

pub use bus::{BusSender, EventBus, EventName, Payload};
pub use session::{Session, SessionError};
