//! Carina Google Cloud Provider
//!
//! Resource handlers for buckets, functions, service accounts, API gateways
//! and IAM.
//!
//! ## Module Structure
//!
//! - `client` - Vendor client traits and wire types
//! - `identifier` - Identifier variants and the identifier registry
//! - `iam` - Policy binding codec
//! - `resources` - One handler per resource type
//! - `provider` - GcpProvider, dispatching requests to handlers
//! - `local` - In-memory implementation of the vendor clients

pub mod client;
pub mod config;
pub mod iam;
pub mod identifier;
pub mod local;
pub mod operation;
pub mod provider;
pub mod resources;
pub mod schemas;

// Re-export main types
pub use config::ProviderConfig;
pub use identifier::GcpIdentifier;
pub use local::LocalCloud;
pub use provider::{GcpClients, GcpProvider};
