mod probe;

pub use probe::ProbeTask;
