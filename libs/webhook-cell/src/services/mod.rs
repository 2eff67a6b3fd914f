pub mod delivery;
pub mod dispatcher;
pub mod registry;

pub use delivery::WebhookDeliveryProcessor;
pub use dispatcher::WebhookDispatcher;
pub use registry::WebhookRegistry;
