//! Integration tests for the nodestash persistence layer

mod common;
mod list_properties;
mod migration_flow;
mod partial_corruption;
mod proxy_save;
mod ragged_layout;
mod sled_roundtrip;
