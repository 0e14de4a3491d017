//! rowproj-cli: projection documents and the commands that drive them.
//!
//! The `rowproj` binary is a thin clap front end over [`doc`].

pub mod doc;

pub use doc::{apply_doc_config, compile, load, parse, DocError, Loaded, ProjectionDoc};
