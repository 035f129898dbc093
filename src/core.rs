pub mod config;
pub mod error;
pub mod gameloop;
pub mod gpu;
pub mod size;
