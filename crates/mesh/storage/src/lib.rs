//! Persistence boundary of the mesh engine
//!
//! The engine never talks to a concrete database. Every component
//! persists through the [`Repository`] trait; [`InMemoryRepository`]
//! is the reference backend used in development and tests.

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
pub mod repository;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryRepository;
pub use repository::Repository;
