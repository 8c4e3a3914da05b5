//! Mutation events and the bus that carries them off the request path.

mod bus;
mod model;

pub use bus::{DiscardEmitter, EventBus, EventEmitter, EventSink};
pub use model::{CatalogEvent, EventPayload, EventType};
