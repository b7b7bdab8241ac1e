pub mod collector;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod event;
pub mod metric;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod snapshot;
pub mod source;
pub mod sources;
pub mod subsystem;
pub mod target;
