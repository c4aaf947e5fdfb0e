mod settings;

pub use settings::{PoolSettings, ProbeSettings, Settings};
