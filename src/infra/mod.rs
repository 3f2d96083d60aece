//! Infrastructure shared by the database and sessions.
pub mod codec;
