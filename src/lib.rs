//! Streamvault - record and playback engine for FLV message streams
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod connection;
pub mod inspect;
pub mod stream;
pub mod transport;
