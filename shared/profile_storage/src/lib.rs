//! Profile storage for the heritage directory
//!
//! This crate owns the persisted profile rows. The backend only reads single
//! profiles and updates their photo reference once an edit session is saved.

pub mod profile;
