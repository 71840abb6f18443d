mod listener;
mod topics;
#[cfg(test)]
mod tests;

pub use listener::*;
pub use topics::*;
