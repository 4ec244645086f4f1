//! Input layer: sample definitions files and derived-variable configs.
//!
//! Parsing only; loading events and building the sample hierarchy happens
//! in `model`.

pub mod color;
pub mod samples;
pub mod variables;

pub use color::Color;
pub use samples::{SampleDef, read_definitions};
pub use variables::VariableConfig;
