//! Driver for the ssanf pipeline.
//!
//! The `ssanf` binary is a thin shell over this library: [`config`] holds the
//! options, [`pipeline`] runs the stages and writes files, [`report`] renders
//! parse errors.

pub mod config;
pub mod pipeline;
pub mod report;

pub use config::Config;
pub use pipeline::{read_back, transform, write_outputs, Outputs, PipelineError};
pub use report::report_parse_error;
