//! Concrete workspace collaborators for localcoder.
//!
//! - [`fs::LocalFileSystem`]: root-scoped file reads and writes
//! - [`shell::ShellRunner`]: streamed shell execution with a timeout
//! - [`guard`]: command blocklist and path containment
//! - [`context::FileListingContext`]: project listing for the planner

pub mod context;
pub mod fs;
pub mod guard;
pub mod shell;

pub use context::FileListingContext;
pub use fs::LocalFileSystem;
pub use guard::{check_command, resolve_within};
pub use shell::ShellRunner;
