pub mod attach;
pub mod config;
