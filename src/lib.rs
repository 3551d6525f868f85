//! syncpoint: a coordination service that lets concurrent agents perform
//! CRUD operations on a shared set of files without losing each other's work.
//!
//! The core idea is diff-based optimistic contention resolution: updates
//! carry the hash the agent last read, and when the file changed underneath
//! it the engine answers with a structured diff instead of clobbering or
//! flatly failing.

pub mod cli;
pub mod config;
pub mod io;
pub mod lock;
pub mod ops;
pub mod path;
pub mod persistence;
pub mod server;

pub use config::Settings;
pub use server::Engine;
