// Shared domain types. None of the store, engine, cache or presenter
// depends on another for its data model.

pub mod item;
pub mod poll;
pub mod query;

pub use item::*;
pub use poll::*;
pub use query::*;
