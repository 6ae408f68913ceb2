//! Two-tier dump storage: local spool plus optional per-user S3 mirror.

pub mod s3;
pub mod spool;
