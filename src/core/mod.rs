pub mod classifier;
pub mod config;
pub mod detection;
pub mod error;
pub mod export;
pub mod video;
