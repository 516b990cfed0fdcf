//! Pulumi provisioning engine for mailstack
//!
//! Renders a [`mailstack_cloud::ResourceGraph`] as a Pulumi YAML program and
//! drives the `pulumi` CLI against a local `file://` backend.
//!
//! # Requirements
//!
//! - `pulumi` CLI must be installed (or `MAILSTACK_PULUMI_BIN` set)
//! - AWS credentials are taken from the environment, as for the AWS SDK
//!
//! # Example
//!
//! ```ignore
//! use mailstack_pulumi::{PulumiCli, PulumiEngine};
//!
//! let cli = PulumiCli::new("pulumi", config_dir.join("pulumi-state"));
//! let engine = PulumiEngine::new(cli, config_dir.join("stacks"));
//! let outputs = engine.apply("mailstack-123456789012-us-east-1", &graph).await?;
//! ```

pub mod cli;
pub mod engine;
pub mod error;
pub mod program;

pub use cli::PulumiCli;
pub use engine::PulumiEngine;
pub use error::{PulumiError, Result};
