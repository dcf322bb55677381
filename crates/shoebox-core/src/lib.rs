//! # Shoebox Core Library
//!
//! `shoebox-core` provides the upload machinery for Shoebox, a personal
//! media-workflow tool that moves photos and videos off a memory card and
//! into a remote photo library.
//!
//! ## Features
//!
//! - **Resumable uploads**: Large files are sent in bounded chunks over the
//!   resumable-upload protocol and survive process restarts
//! - **Server-confirmed progress**: Only offsets the server acknowledged are
//!   ever persisted, so a resumed upload never skips bytes
//! - **Media validation**: Files are size-checked and content-sniffed before
//!   any network activity
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`error`] - Error taxonomy shared by every operation
//! - [`register`] - Exchanges an upload token for a media item
//! - [`upload`] - Resumable chunked-upload client
//!
//! ## Example
//!
//! ```rust,ignore
//! use shoebox_core::upload::{SessionStore, UploadClient, Uploader, UploadOptions};
//!
//! let client = UploadClient::new("https://photoslibrary.googleapis.com/v1/uploads", token)?;
//! let store = SessionStore::new().await?;
//! let uploader = Uploader::new(client, store, UploadOptions::default());
//!
//! let upload_token = uploader.upload("DCIM/100CANON/IMG_0001.JPG".as_ref()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod error;
pub mod register;
pub mod upload;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default remote API base for the photo library
pub const DEFAULT_API_BASE: &str = "https://photoslibrary.googleapis.com/v1";

/// Default chunk size for uploads (10 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Default per-chunk deadline in seconds
pub const DEFAULT_CHUNK_TIMEOUT_SECS: u64 = 120;

/// Smallest file accepted for upload
pub const MIN_FILE_SIZE: u64 = 1;

/// Largest file accepted for upload (20 GiB, the service's video ceiling)
pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024 * 1024;

/// Default age after which abandoned session records are pruned (7 days)
pub const DEFAULT_SESSION_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;
