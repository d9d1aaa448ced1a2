//! Configuration management for the layout engine

pub mod settings;

pub use settings::{parse_level, EngineSettings, Settings};
