// control_system/mod.rs
pub mod traffic_light_controller;
