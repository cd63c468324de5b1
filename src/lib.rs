//! # Synapse Sync
//!
//! Mirrors a project from a file-hosting source (Google Drive, or a local
//! directory) into a Synapse project, and carries PROV-JSON provenance across
//! as Synapse activities.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌─────────────┐
//! │   Source    │──▶│   Source tree    │──▶│  Synapse    │
//! │ Drive / FS  │   │ ignore + grow    │   │ folders +   │
//! └─────────────┘   └────────┬─────────┘   │ files       │
//!                            │             └──────▲──────┘
//!                   ┌────────▼─────────┐          │
//!                   │  PROV-JSON docs  │──────────┘
//!                   │ (per subproject) │  activities
//!                   └──────────────────┘
//! ```
//!
//! The engine (tree, materializer, resolver, binder) lives in
//! `synapse-sync-core`; this crate supplies the concrete source and
//! destination clients, configuration, and the `ssync` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Local-directory source |
//! | [`connector_gdrive`] | Google Drive v2 source |
//! | [`synapse`] | Synapse REST destination |
//! | [`prov`] | PROV-JSON loading and entity checks |
//! | [`pipeline`] | Command orchestration |
//! | [`progress`] | Progress reporting on stderr |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod connector_fs;
pub mod connector_gdrive;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod prov;
pub mod synapse;
