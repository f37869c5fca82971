//! Filesystem primitives shared across setup stages.

pub mod archive;
pub mod linker;
pub mod paths;

pub use archive::extract_archive;
pub use linker::{LinkEntry, LinkRecord, LinkReport, link_roots};
pub use paths::absolutize;
