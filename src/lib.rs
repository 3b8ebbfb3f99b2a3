pub mod config;
pub mod nes;
