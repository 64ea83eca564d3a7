//! Configuration for the tabrelay native host

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::*;
