pub mod collections;
pub mod endpoints;
