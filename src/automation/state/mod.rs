pub mod coordinator;

pub use coordinator::{ActivityGuard, CoordinatorActor, CoordinatorClient, CoordinatorCommand};
