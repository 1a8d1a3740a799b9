//! Credential Broker: App JWT minting, installation token cache, and the
//! installation-scoped GitHub REST client.

pub mod broker;
pub mod cache;
pub mod client;
pub mod jwt;

pub use broker::CredentialBroker;
pub use client::{InstallationClient, OrgMember, PrFile, PrMeta, RepoSummary};
