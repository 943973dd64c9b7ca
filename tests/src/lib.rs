//! # Twin-Connect Test Suite
//!
//! Cross-crate flows that no single crate can exercise on its own.
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── mapping_flow.rs      # connection config → dispatcher → router
//!     ├── streaming_flow.rs    # sessions ↔ hub ↔ router
//!     └── supervision_flow.rs  # supervisor restarts, TCP reconnect
//! ```
//!
//! ```bash
//! cargo test -p tc-tests
//! cargo test -p tc-tests integration::streaming_flow
//! ```

pub mod integration;
