//! Contract event streams.
//!
//! Historical records come from a one-shot log query and live records from a
//! backend subscription. [`EventIterator`] joins the two into a single ordered
//! pull stream and [`EventWatch`] pushes the same stream into a channel.

pub mod iterator;
pub mod source;
pub mod watcher;

pub use iterator::{EventIterator, IteratorState};
pub use watcher::{EventSink, EventWatch};
