pub mod environment;
pub mod settings;
