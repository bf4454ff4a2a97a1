pub mod reproducibility;

pub use reproducibility::ReproLog;
