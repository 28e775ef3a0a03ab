pub mod dataset;
pub mod diff;
pub mod grid;
pub mod normalize;
pub mod stats;
pub mod value;

pub use dataset::{ByColumn, ColumnKind, Dataset, Preview};
pub use grid::{Grid, MergeRange};
pub use value::Value;
