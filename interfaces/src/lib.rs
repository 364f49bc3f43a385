pub mod defs;
pub mod empty;

pub use defs::{ContentSource, DeliveryOutcome, Item, Notifier, ResolvedChannel, SourceError};
pub use empty::{DiscardNotifier, EmptySource};
