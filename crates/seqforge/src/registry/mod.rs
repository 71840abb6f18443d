mod connector;
mod endpoint;
mod handle;
mod pools;

pub use connector::*;
pub use endpoint::*;
pub use handle::*;
pub use pools::*;
