//! Heritage directory backend service

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

/// S3 photo storage
pub mod media_storage;

/// Photo edit sessions
pub mod photo_session;

/// Profile persistence seam
pub mod profile_repository;

/// HTTP routes
pub mod routes;

/// Server setup
pub mod server;

/// Presigned URL cache
pub mod signed_urls;

/// Shared types
pub mod types;
