//! Application layer - the engine that drives the strategy

pub mod engine;

pub use engine::Engine;
