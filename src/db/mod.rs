pub mod connection;
pub mod logs;
pub mod migrations;
pub mod models;
pub mod photos;
pub mod postcodes;
pub mod schema;
pub mod servers;
pub mod stats;
pub mod trigs;

pub use connection::*;
pub use models::*;

#[cfg(test)]
pub mod test_fixtures;
