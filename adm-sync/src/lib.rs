//! Load-balancer topology reconciliation.
//!
//! Devices reported by a device-management system are reconciled into a
//! source-of-truth inventory using the generic engine in `graph_diff_core`.
//!
//! # Architecture
//!
//! - [`model`]: the six entity kinds (site, device, port, subnet, address,
//!   binding) and their identities
//! - [`feed`]: raw feed records and the [`feed::FeedClient`] contract
//! - [`topology`]: merges the per-device feeds into port/address records
//! - [`source`]: adapter that builds the graph from a feed client
//! - [`store`]: JSON-file inventory with referential protection
//! - [`target`]: adapter over the inventory, including provenance labels
//! - [`config`]: TOML job configuration
//! - [`job`]: runs every configured instance in sequence
//! - [`report`]: colored terminal output
//!
//! # Example
//!
//! ```ignore
//! use adm_sync::config::load_config;
//! use adm_sync::job::{run_job, JobOptions};
//!
//! let config = load_config("adm-sync.toml".as_ref())?;
//! let report = run_job(&config, &JobOptions { dry_run: true, ..JobOptions::default() })?;
//! ```

/// Log a per-entity load or write event: `info!` in debug jobs, `debug!`
/// otherwise.
#[macro_export]
macro_rules! load_event {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            ::tracing::info!($($arg)+);
        } else {
            ::tracing::debug!($($arg)+);
        }
    };
}

pub mod config;
pub mod feed;
pub mod job;
pub mod model;
pub mod parse;
pub mod report;
pub mod source;
pub mod store;
pub mod target;
pub mod topology;
