//! Schema Event Source
//!
//! The builder never looks at document text. It consumes a flat sequence of
//! structural events through [`EventSource`]; [`YamlEventSource`] produces
//! that sequence from a YAML document.

pub mod event;
pub mod yaml;

pub use event::{Event, EventKind, EventSource, VecEventSource};
pub use yaml::YamlEventSource;
