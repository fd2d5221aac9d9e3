//! Business logic services.

pub mod callback_ingestor;
pub mod task_locks;
pub mod task_registry;

pub use callback_ingestor::{CallbackIngestor, CallbackSubmission};
pub use task_locks::{TaskLockGuard, TaskLocks};
pub use task_registry::{RegistryError, TaskRegistry};
