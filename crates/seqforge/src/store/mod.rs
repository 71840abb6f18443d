mod error;
mod interface;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use error::*;
pub use interface::*;
pub use memory::*;
#[cfg(feature = "redis")]
pub use self::redis::*;
