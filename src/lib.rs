//! # Secret Store Sync
//!
//! Synchronizes secrets from a source secret store to a target secret store
//! according to a declarative sync plan.
//!
//! ## Overview
//!
//! A plan is a list of actions. Each action describes:
//!
//! 1. **What to read** - a single ref, a regex-filtered query, or named
//!    multi-source selectors
//! 2. **How to transform** - optional text templating with a fixed helper
//!    vocabulary (`base64enc`, `base64dec`, `contains`, `hasPrefix`,
//!    `hasSuffix`)
//! 3. **Where to write** - a single key, prefixed bulk keys, or the source ref
//!
//! [`sync::sync`] plans all actions concurrently, unions their write intents
//! (a collision on the same key and version aborts the invocation), then
//! writes every intent concurrently and reports a [`sync::SyncStatus`].
//! Execution is one-shot or recurs on a CRON schedule via [`scheduler::run`].
//!
//! Backends register against the [`provider::Provider`] contract; the crate
//! ships a filesystem store and a Vault-style KV store.

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod sync;
pub mod telemetry;

pub use error::SyncError;
pub use model::{
    Query, SecretQuery, SecretRef, SecretSource, SyncAction, SyncPlan, SyncTarget, SyncTemplate,
};
pub use provider::{
    ProviderRegistry, SecretStoreConfig, StoreClient, StoreReader, StoreWriter,
};
pub use sync::{sync, SyncStatus};
