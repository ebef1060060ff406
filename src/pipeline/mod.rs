//! Pipeline stages for Aozora HTML to segmented text conversion.
//!
//! Each submodule implements exactly one transformation step and can be
//! used and tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ strip ──▶ segment ──▶ postprocess
//! (file)    (decode+NFC)  (FSM)     (analyzer)   (optional trim)
//! ```
//!
//! 1. [`input`]:     read a local file into a `SourceDocument`
//! 2. [`normalize`]: decode Shift_JIS (or a declared/sniffed encoding)
//!    without replacement, unify line endings, apply NFC
//! 3. [`strip`]:     remove tags, ruby glosses, gaiji references and
//!    editorial notes; [`extract`] picks the work body and [`annotation`]
//!    holds the span type and note classification
//! 4. [`segment`]:   ask the analyzer for word boundaries and join tokens;
//!    the only stage that runs on the blocking pool
//! 5. [`postprocess`]: the optional `trim_whitespace` rules

pub mod annotation;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod postprocess;
pub mod segment;
pub mod strip;
