//! Aggregation model: samples grouped into blocks grouped into trees, and the
//! weighted histograms and yields they produce.
//!
//! Ownership is strictly top-down. A `Tree` owns its `Block`s, a `Block`
//! owns its `Sample`s, and every histogram or yield is computed bottom-up
//! and merged on the way out.

pub mod block;
pub mod histogram;
pub mod sample;
pub mod tree;

pub use histogram::{Binning, Histogram, Histogram2D, Histogram2DRequest, HistogramRequest, Stack, Yield};
pub use sample::LoadContext;
pub use tree::{ParseOptions, Tree};
