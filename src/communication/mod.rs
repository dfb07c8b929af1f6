// communication/mod.rs
pub mod messages;
pub mod shutdown;
