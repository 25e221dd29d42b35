pub mod backend;
pub mod flusher;
pub mod json_backend;
pub mod snapshot;

pub use backend::PersistenceBackend;
pub use flusher::FlushScheduler;
pub use json_backend::JsonFileBackend;
pub use snapshot::SessionSnapshot;
