pub mod cloudfiles;
pub mod error;
pub mod s3;
pub mod storage;
