mod client;
mod config;
mod factory;
mod maintainer;
mod object;

pub use client::*;
pub use config::*;
pub use factory::*;
pub use object::EvictionReport;
