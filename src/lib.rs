// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # libris
//!
//! A research workbench for library catalogs and archival finding aids.
//!
//! ## Architecture
//!
//! - **Document store** (`store`): typed records in redb, one table per collection
//! - **Text extraction** (`extract`): PDF pages to normalized text
//! - **Analysis** (`analysis`): LLM summary and research topics, retried and memoized
//! - **Finding aids** (`finding_aid`): upload records and their analysis lifecycle
//! - **Projects** (`project`): research projects linking finding aids and publications
//! - **Search** (`search`): scholarly publication lookup
//! - **Images** (`imaging`): resizing uploads into web presets
//! - **Facade** (`workbench`): every user-facing operation in one place
//! - **HTTP** (`server`, feature `server`): JSON API over the workbench
//!
//! ## Library usage
//!
//! ```no_run
//! use libris::config::LibrisConfig;
//! use libris::model::EducationLevel;
//! use libris::paths::LibrisPaths;
//! use libris::workbench::Workbench;
//!
//! let config = LibrisConfig::default();
//! let paths = LibrisPaths::from_root(std::path::Path::new("/tmp/libris"));
//! let workbench = Workbench::open(&config, paths).unwrap();
//! let id = workbench
//!     .create_project("Whaling economies", "Logbooks and ledgers", EducationLevel::Graduate)
//!     .unwrap();
//! println!("created project {id}");
//! ```

pub mod analysis;
pub mod books;
pub mod config;
pub mod error;
pub mod extract;
pub mod finding_aid;
pub mod imaging;
pub mod model;
pub mod paths;
pub mod project;
pub mod search;
pub mod secret;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod workbench;
