// simulation_engine/mod.rs
pub mod generator;
pub mod intersections;
pub mod junction;
pub mod lane_store;
pub mod lanes;
pub mod movement;
pub mod queues;
pub mod routes;
pub mod simulation;
pub mod stepper;
pub mod traversal;
pub mod vehicles;
