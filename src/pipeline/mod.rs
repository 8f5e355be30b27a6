//! Per-request pipeline stages around a backend attempt.
//!
//! ```text
//! input ──▶ (backend attempt) ──▶ resolve ──▶ validate
//! ```
//!
//! 1. [`input`]: normalise extensions, gate on the allow-list, own the
//!    staged upload
//! 2. [`resolve`]: locate the file a backend actually produced and move it
//!    to the canonical output path
//! 3. [`validate`]: existence, minimum size and extension checks

pub mod input;
pub mod resolve;
pub mod validate;
