//! Common types, protocol definitions, and errors shared by the `fieldguard`
//! library and its admin server.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
