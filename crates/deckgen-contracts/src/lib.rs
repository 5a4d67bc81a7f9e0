pub mod config;
pub mod markdown;
pub mod models;
pub mod outline;
pub mod prompts;
pub mod providers;
pub mod resolution;
