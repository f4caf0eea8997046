pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod portal;
pub mod render;
pub mod state;
pub mod utils;
pub mod worker;
