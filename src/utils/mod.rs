pub mod background;
pub mod graceful_shutdown;
pub mod panic;

pub use background::BackgroundTasks;
pub use graceful_shutdown::{GracefulShutdown, ShutdownPhase, ShutdownReason, ShutdownToken};
pub use panic::describe_panic;
