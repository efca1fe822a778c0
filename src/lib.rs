pub mod api;
pub mod core;

pub use crate::api::{ReadoutSession, RunHandle, RunSummary, SessionEvent};
pub use crate::core::config::RunConfig;
pub use crate::core::error::{ErrorKind, ReadoutError, Result};

/// Install the platform logger. Safe to call more than once.
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("segment_readout"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
