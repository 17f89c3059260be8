//! geolookup - IPv4 geolocation and ASN lookup with hot-swapped datasets.
//!
//! The crate resolves a public IPv4 address against two MaxMind databases,
//! a "city" dataset and an "ASN" dataset, and keeps both current by
//! re-downloading them on a fixed interval.
//!
//! # Features
//!
//! - **Verified downloads**: bodies must match the declared length
//! - **Atomic hot swap**: the city/ASN pair is replaced as a unit; lookups
//!   never see one dataset from one snapshot and the other from another
//! - **No I/O under the lock**: files are opened before the swap, the
//!   exclusive section only replaces handles
//! - **Fail-fast refresh**: a failed refresh ends the loop and is reported
//!   to its supervisor instead of silently serving stale data forever
//!
//! # Quick Start
//!
//! ```ignore
//! use geolookup::{prepare_datasets, Config, DatasetStore, Fetcher, LookupService};
//! use std::sync::Arc;
//!
//! let config = Config::from_file("config.yml")?;
//! let fetcher = Fetcher::new()?;
//! let store = Arc::new(DatasetStore::new());
//!
//! // Download missing files and install them
//! prepare_datasets(&fetcher, &store, &config.download)?;
//!
//! let lookup = LookupService::new(store);
//! let result = lookup.resolve("8.8.8.8".parse()?)?;
//! println!("{}", serde_json::to_string(&result)?);
//! ```
//!
//! # Refresh
//!
//! [`RefreshScheduler`] runs on its own thread. Each tick deletes and
//! re-downloads both files, opens them, and swaps them in. The returned
//! [`RefreshHandle`] reports why the loop ended, and [`supervise`] turns
//! any exit into the fatal error the process should stop with.

mod error;

pub mod addr;
pub mod config;
pub mod dataset;
pub mod fetcher;
pub mod http;
pub mod logging;
pub mod lookup;
pub mod scheduler;
pub mod store;

// Re-export core types
pub use error::{Error, FetchError, LoadError, LookupError, ReaderError, RefreshError, Result};

pub use addr::{classify, Rejection};
pub use config::{Config, DatasetConfig, LogConfig};
pub use dataset::{DatasetPaths, DatasetReader, DatasetSet, MmdbReader, Record};
pub use fetcher::Fetcher;
pub use http::{HttpServer, HttpSettings};
pub use lookup::{LookupResult, LookupService};
pub use scheduler::{prepare_datasets, supervise, RefreshHandle, RefreshScheduler};
pub use store::DatasetStore;
