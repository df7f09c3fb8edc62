//! # Insight Source Map
//!
//! Recovers original source files from revision 3 source maps.
//!
//! Restoration walks the `mappings` of a map, collects every source the
//! mappings actually reference, and returns the inline `sourcesContent` of
//! each. Anything malformed fails closed so callers can fall back to the
//! compiled code.
//!
//! ```rust
//! let map = br#"{"version":3,"sources":["app.ts"],"sourcesContent":["const x=1;"],"mappings":"AAAA"}"#;
//! let restoration = insight_source_map::restore(map).unwrap();
//! assert_eq!(restoration.sources()[0].original_file, "app.ts");
//! ```

mod error;
mod locate;
mod restorer;
mod vlq;

pub use error::{RestoreError, Result};
pub use locate::{decode_data_url, map_reference, MapReference};
pub use restorer::{restore, Restoration, RestoredSource};
