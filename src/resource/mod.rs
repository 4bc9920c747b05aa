//! Resource model and filtering
//!
//! - [`model`] - Managed resources, power states and snapshots
//! - [`filter`] - Case-insensitive name filter producing a batch working set

mod filter;
mod model;

pub use filter::filter_resources;
pub use model::{ManagedResource, PowerState, ResourceDetails, Snapshot};
