//! External collaborators: broker, object storage and database.

pub mod handoff;
pub mod mqtt;
pub mod s3;
pub mod storage;
