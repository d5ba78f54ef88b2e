//! Nodestash: Typed Record Persistence
//!
//! Maps typed in-memory records and collections onto a hierarchical
//! group/attribute/dataset container. Scalars become attributes, homogeneous
//! collections become packed columnar datasets, nested records become child
//! groups tagged with their registered kind. [`DiskDict`] and [`DiskList`]
//! are lazy views over stored collections, and [`DiskData`] groups them into
//! fields that can be staged in scratch storage until
//! [`DiskData::save_to_disk`] is called.

pub mod codec;
pub mod config;
pub mod disk_data;
pub mod error;
pub mod logging;
pub mod migration;
pub mod registry;
pub mod store;
pub mod tooling;
pub mod types;
pub mod views;

pub use disk_data::{DiskData, FieldDecl};
pub use error::{Result, StoreError};
pub use migration::{Migrator, SchemaVersion};
pub use registry::{FieldDefault, Record, RecordSchema};
pub use store::{AttrValue, Container, Node};
pub use types::{ArrayValue, RecordValue, ScalarType, TypeDescriptor, Value};
pub use views::{CollectionType, DiskDict, DiskList, Placement};
