pub mod build;
pub mod monitor;
