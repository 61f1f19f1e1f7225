//! A chunked rapid-upload engine and the bounded-parallelism pool that
//! drives many of them concurrently.
//!
//! [`uploader::Uploader`] carries one file through hash precompute,
//! rapid-upload, chunked slice transfer, finalize, and verification.
//! [`pool::UploaderPool`] schedules many uploaders under a bound on
//! concurrency and aggregate bandwidth, fanning out their lifecycle events
//! to a single subscriber.
//!
//! HTTP marshalling, authentication, and wire-level retries are out of
//! scope: a caller supplies a [`transport::UploadTransport`] implementation
//! and this crate drives it.

pub mod cancel;
pub mod error;
pub mod hashing;
pub mod pool;
pub mod slice;
pub mod throttle;
pub mod transport;
pub mod uploader;
pub mod util;
