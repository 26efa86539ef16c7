pub mod event_bus;
pub mod events;

pub use event_bus::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
pub use events::{ConnectorUpdate, Event, EventMessage, PaymentUpdate, StationUpdate};
