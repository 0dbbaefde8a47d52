//! HTTP handlers for generic entity CRUD.

pub mod entity;
pub use entity::*;
