mod clock;
mod counter;
mod facade;
mod interface;
#[cfg(test)]
mod tests;

pub use counter::*;
pub use facade::*;
pub use interface::*;
