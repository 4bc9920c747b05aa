//! vmctl
//!
//! Batch lifecycle control for virtual machines on a management endpoint.
//!
//! # Module Structure
//!
//! - [`resource`] - Resource model and name filter
//! - [`provider`] - Provider trait, REST and in-memory providers
//! - [`lifecycle`] - Batch lifecycle controller
//! - [`dispatcher`] - Menu state machine over the controller
//! - [`report`] - Session and inventory report
//! - [`console`] - Terminal prompts and rendering
//! - [`config`] - Configuration file loading
//!
//! # Example
//!
//! ```ignore
//! use vmctl::lifecycle::{ControllerOptions, LifecycleController};
//! use vmctl::provider::ResourceProvider;
//! use vmctl::resource::filter_resources;
//!
//! async fn start_web(provider: &dyn ResourceProvider) -> anyhow::Result<()> {
//!     let inventory = provider.list_resources().await?;
//!     let web = filter_resources(&inventory, Some("web"));
//!     let controller = LifecycleController::new(provider, ControllerOptions::default());
//!     for result in controller.power_on(&web).await {
//!         println!("{}", result.summary_line());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod dispatcher;
pub mod lifecycle;
pub mod provider;
pub mod report;
pub mod resource;
