//! Application services layer: filtering, statements and cached lookups.

pub mod error;
pub mod filter;
pub mod params;
pub mod repos;
pub mod resources;
pub mod statement;
