pub mod app;
pub mod error;
pub mod logging;
pub mod player;
