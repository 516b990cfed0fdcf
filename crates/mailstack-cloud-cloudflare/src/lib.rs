//! Cloudflare integration for mailstack
//!
//! Two independent pieces:
//!
//! - [`CloudflareDns`]: writes records into a Cloudflare zone when the
//!   sending domain is delegated there
//! - [`DohResolver`]: public DNS-over-HTTPS lookups used by `verify`
//!
//! # Requirements
//!
//! - For zone writes: `CLOUDFLARE_API_TOKEN` and `CLOUDFLARE_ZONE_ID` env vars
//!
//! # Example
//!
//! ```ignore
//! use mailstack_cloud_cloudflare::{CloudflareDns, DnsConfig, DohResolver};
//!
//! if let Some(config) = DnsConfig::from_env_opt() {
//!     zones.push(Arc::new(CloudflareDns::new(config)));
//! }
//! let resolver = DohResolver::default();
//! ```

pub mod dns;
pub mod error;
pub mod resolver;

pub use dns::{CloudflareDns, DnsConfig};
pub use error::{CloudflareError, Result};
pub use resolver::{DEFAULT_DOH_ENDPOINT, DohResolver};
