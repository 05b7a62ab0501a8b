pub mod cli;
pub mod config;
pub mod events;
pub mod runner;
