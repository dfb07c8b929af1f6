// monitoring/mod.rs
pub mod move_bus;
pub mod move_recorder;
pub mod query;
pub mod stats_reporter;
