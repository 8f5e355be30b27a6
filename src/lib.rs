//! # docshift
//!
//! Convert documents, spreadsheets, presentations, images and text between
//! formats by dispatching each request to the cheapest backend that can do it.
//!
//! ## Why this crate?
//!
//! No single converter handles every pair well. Pure transcoders are fast and
//! predictable but narrow; a headless office suite reads almost anything but
//! is slow, stateful and sometimes silently writes nothing; a cloud API costs
//! money per job. This crate tries them in that order, checks every output
//! file it is handed, and reports one actionable error when all of them fail.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Intake    allow-listed extension, filename length, recognised format
//!  ├─ 2. Direct    built-in transcoders (spawn_blocking) and wkhtmltopdf
//!  ├─ 3. Office    headless LibreOffice, output resolved by name or recency
//!  ├─ 4. Cloud     CloudConvert job: upload, poll, download
//!  └─ 5. Validate  exists, ≥100 bytes, extension matches; rejects deleted
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docshift::{ConversionEngine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Office suite, wkhtmltopdf and pdfium are probed once here.
//!     let engine = ConversionEngine::new(EngineConfig::from_env().build()?);
//!     let out = engine.convert_file("notes.txt", "txt", "html", "notes.txt").await?;
//!     println!("{} via {}", out.output_path.display(), out.backend);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docshift` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docshift = { version = "0.3", default-features = false }
//! ```
//!
//! ## Optional Engines
//!
//! | Engine | Found via | Enables |
//! |--------|-----------|---------|
//! | LibreOffice | `DOCSHIFT_OFFICE_BINARY`, PATH, install dirs | legacy and ODF formats, office → PDF/HTML |
//! | wkhtmltopdf | `DOCSHIFT_WKHTMLTOPDF`, fixed paths, PATH | HTML → PDF |
//! | pdfium | `PDFIUM_LIB_PATH` or system library | PDF → text, image, docx, pptx |
//! | CloudConvert | `CLOUDCONVERT_API_KEY` | anything else a local backend recognises |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backends;
pub mod cleanup;
pub mod config;
pub mod convert;
pub mod error;
pub mod formats;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod registry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backends::{AttemptContext, BackendSet, ConversionBackend};
pub use cleanup::{spawn_sweeper, sweep_directory};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use convert::ConversionEngine;
pub use error::{AdapterError, AdapterErrorKind, AttemptFailure, ConversionError, ValidationFailure};
pub use observer::{DispatchObserver, NoopObserver};
pub use output::ConversionOutput;
pub use pipeline::input::ConversionRequest;
pub use pipeline::validate::validate;
pub use probe::BackendProbe;
pub use registry::{BackendDescriptor, Capabilities, CapabilityRegistry, Claims, PriorityClass};
