//! Local-first persistence and sync core for the Inventra inventory and
//! accounting app: entity model, store contract, outbox and the data facade.

pub mod data;
pub mod entities;
pub mod errors;
pub mod store;
pub mod sync;
pub mod tables;

pub use errors::{DatabaseError, Error, Result, ValidationError};
