//! Probe HFS, HFS Plus and HFSX volumes for a disk arbitration daemon.
//!
//! The volume name is read straight from the Catalog B-tree of an unmounted
//! device, and volume UUIDs are read, derived and assigned through the
//! finder info of the volume header.

#![forbid(unsafe_code)]

pub mod btree;
pub mod catalog;
pub mod config;
pub mod device;
pub mod error;
pub mod extents;
pub mod identity;
pub mod mounts;
pub mod ops;
pub mod overflow;
pub mod volume;

pub use config::Config;
pub use device::Device;
pub use error::{ConfirmedFormat, Error, ErrorKind, Result, Status};
pub use identity::{LegacyUuid, derive_full_uuid, generate_legacy_uuid};
pub use ops::{Action, DeviceSpec, Host};
