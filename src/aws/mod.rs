//! AWS request plumbing shared by the Bedrock and S3 Vectors backends.

pub mod client;
pub mod credentials;
pub mod sigv4;

pub use client::AwsJsonClient;
pub use credentials::{resolve_credentials, AwsCredentials};
