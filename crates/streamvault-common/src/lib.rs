//! Streamvault-Common: shared types and utilities.
//!
//! - **Typed IDs**: message stream and output channel identifiers
//! - **Publishing types**: the `live` / `record` / `append` publish modes
//! - **Record paths**: mapping a stream name to its scratch and final files
//! - **Error Handling**: common error type and result alias
//!
//! # Examples
//!
//! ```
//! use streamvault_common::{PublishingType, StreamId};
//! use streamvault_common::paths::RecordStore;
//!
//! let stream_id = StreamId::new(1);
//! assert_eq!(stream_id.get(), 1);
//!
//! let publishing: PublishingType = "live".parse().unwrap();
//! assert_eq!(publishing, PublishingType::Live);
//!
//! let store = RecordStore::new("/var/records", "flv");
//! let paths = store.record_paths("cam1").unwrap();
//! assert!(paths.scratch.as_path().ends_with("cam1.data"));
//! assert!(paths.final_file.as_path().ends_with("cam1.flv"));
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
