pub mod bridges;
pub mod config;
pub mod control;
pub mod engine;
pub mod lifecycle;
pub mod status;
pub mod unit;
