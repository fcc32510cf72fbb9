//! The Lattice core engine.
//!
//! This crate holds everything between the HTTP edge and the database
//! driver: the reflected catalog, the structured-JSON and GraphQL query
//! compilers, the mutation executor and transaction coordinator, token
//! handling, and the post-commit effect dispatcher. The server binary in
//! the workspace root is a thin shell around this crate.

#[macro_use]
extern crate tracing;

pub mod adm;
pub mod cat;
pub mod cnf;
pub mod dbs;
pub mod err;
pub mod fx;
pub mod gql;
pub mod iam;
pub mod sql;

pub use cat::Engine;
pub use err::Error;

/// The result type used across the engine.
pub type Result<T> = std::result::Result<T, Error>;
