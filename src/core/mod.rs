// Core modules implementing the table format, read engine, writer and derivations.
pub mod analysis;
pub mod cell;
pub mod cursor;
pub mod derive;
pub mod error;
pub mod format;
pub mod index;
pub mod normalise;
pub mod payload;
pub mod row;
pub mod sampling;
pub mod schema;
pub mod store;
pub mod types;
pub mod wire;
pub mod writer;
