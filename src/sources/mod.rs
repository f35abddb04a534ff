//! Built-in `SourceAggregate` implementations

pub mod samples;

pub use samples::SampleTableSource;
