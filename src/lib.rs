pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod payment;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{CliConfig, Command};

pub use config::{IlsKind, PortalConfig};
pub use core::{Flash, FlashLevel, PortalService, RequestAggregator};
pub use domain::{Patron, SortField, View};
pub use utils::error::{PortalError, Result};
