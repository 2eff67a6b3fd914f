pub mod memory;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use memory::InMemoryJobStore;
pub use queue::RedisJobStore;
pub use scheduler::{next_midnight, JobScheduler};
pub use store::JobStore;
pub use worker::{JobProcessor, JobWorkerService};
