//! A single storage interface over Amazon S3 and Rackspace Cloud Files.
//!
//! [`cdn::Cdn`] picks a provider adapter by name and forwards bucket and
//! object operations to it. Each adapter talks to its vendor through a small
//! trait ([`model::s3::S3Api`], [`model::cloudfiles::CloudFilesApi`]) so the
//! adapter logic can run against a test double.

pub mod adapters;
pub mod cdn;
pub mod config;
pub mod model;
pub mod util;
