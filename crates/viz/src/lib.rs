//! Visualization engine: generated Lua chart code is repaired, executed in a
//! sandbox against a dataset, and each `plotN(df)` routine is rendered to PNG.

pub mod api;
pub mod executor;
pub mod figure;
pub mod render;
pub mod repair;
pub mod sandbox;

pub use executor::{execute, ImageOutput, RoutineFailure, VisualizationResult, VizOptions};
pub use repair::ColumnRepair;
