//! HTTP client for the fieldsync server's snapshot and forms endpoints.

mod api;
mod client;
mod error;

pub use api::SyncApi;
pub use client::{PullFormsResponse, RemoteSyncClient, UpsertFormsRequest};
pub use error::{ApiRetryClass, RemoteSyncError, Result};
