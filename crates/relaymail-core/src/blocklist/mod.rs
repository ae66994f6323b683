//! Persisted recipient block list.
//!
//! The block list is a flat set of canonical addresses stored as one object,
//! one address per line. It is read once per batch; admin commands add to it
//! and write the whole set back.

mod model;
mod repository;

pub use model::BlockList;
pub use repository::BlockListStore;
