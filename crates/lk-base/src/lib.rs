pub mod config;
pub mod constants;
pub mod credentials;
pub mod settings;
