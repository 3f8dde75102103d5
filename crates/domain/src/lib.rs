pub mod entities;
pub mod error;
pub mod repositories;
pub mod schema;
pub mod value_objects;
