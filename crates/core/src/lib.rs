pub mod record;
pub mod store;

pub use record::AnalysisRecord;
pub use store::{DirStore, KvStore, MemoryStore, StoreError};
