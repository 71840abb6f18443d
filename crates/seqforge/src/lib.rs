//! Namespace-scoped sequence ids.
//!
//! Two interchangeable backends implement [`SequenceGenerator`]:
//! [`CounterSequence`] keeps one integer counter per namespace in a shared
//! store reached through pooled clients, and [`ClockSequence`] composes
//! Snowflake-style ids from a timestamp, a node id and a rolling sequence.
//! [`IdGenerator`] wraps either behind one cloneable handle.
//!
//! Store connections are owned by a [`ClientPoolRegistry`], which creates one
//! bounded [`ClientPool`] per endpoint and pool configuration and retires
//! pools that fall idle. [`TopicRegistry`] layers pub/sub on the same pools.

mod error;
mod namespace;
mod pool;
mod pubsub;
mod registry;
mod sequence;
mod snowflake;
mod stop;
mod store;
mod time;

pub use crate::error::*;
pub use crate::namespace::*;
pub use crate::pool::*;
pub use crate::pubsub::*;
pub use crate::registry::*;
pub use crate::sequence::*;
pub use crate::snowflake::*;
pub use crate::stop::*;
pub use crate::store::*;
pub use crate::time::*;
