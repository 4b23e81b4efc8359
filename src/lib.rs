//! # Content Sync
//!
//! Transactional persistence for text content records whose authoritative
//! body may live outside the store, plus the machinery that keeps the two
//! in step.
//!
//! A record is either authored locally or points at an external location
//! through its `extern_path`. Locations are plain HTTP(S) URLs, paths
//! relative to a configured base URL, or files in a GitLab repository.
//! GitLab-backed namespaces are reconciled in bulk against the repository
//! tree at one pinned commit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ ContentWriter│◀──│  ItemSyncer  │◀──│  Reconciler  │
//! │  (SQLite tx) │   │  URL/GitLab  │   │ pin/list/diff│
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           ▼                  ▼
//!                      ┌─────────┐       ┌───────────┐
//!                      │ Fetcher │       │  GitApi   │
//!                      └─────────┘       └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`error`] | Error kinds with codes and statuses |
//! | [`models`] | Records, drafts, patches, sources |
//! | [`identity`] | Public/internal id allocation |
//! | [`queries`] | Statement helpers run inside transactions |
//! | [`writer`] | Transactional create / update / delete |
//! | [`people`] | Persons referenced by contributors |
//! | [`fetch`] | HTTP fetch collaborator |
//! | [`gitlab`] | GitLab API collaborator |
//! | [`sync`] | Single-item synchronization |
//! | [`reconcile`] | Whole-source reconciliation |
//! | [`service`] | Operations exposed to a request boundary |
//! | [`get`] | Record lookup by public id or `namespace/slug` |
//! | [`sources`] | Listing of configured sources |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod get;
pub mod gitlab;
pub mod identity;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod people;
pub mod queries;
pub mod reconcile;
pub mod service;
pub mod sources;
pub mod sync;
pub mod writer;
