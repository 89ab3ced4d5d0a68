//! Protocol Generator
//!
//! Turns a declarative protocol document into a C object model: a family of
//! element types sharing one vtable, with constructors that build a
//! single-parent tree and an allocation context that tears every instance
//! down in one pass.
//!
//! ## Pipeline
//!
//! ```text
//! YAML document
//!   └─ schema::YamlEventSource   structural events with positions
//!        └─ builder::ProtocolBuilder   validated model, `extends` flattened
//!             └─ resolve::DispatchTable   implementor + linkage per slot
//!                  └─ codegen::synthesize   header + implementation
//! ```
//!
//! ## Example
//!
//! ```
//! use protogen::{synthesize, CodegenConfig, DispatchTable, ProtocolBuilder, ResolveOptions};
//! use protogen::schema::YamlEventSource;
//!
//! let doc = "configuration:\n  protocol_name: expr\nprotocol:\n  eval:\n    return: int\n    default: returns 0\nLit:\n  fields:\n    value: int\n";
//! let mut events = YamlEventSource::from_str(doc)?;
//! let protocol = ProtocolBuilder::default().build(&mut events)?;
//! let table = DispatchTable::resolve(&protocol, ResolveOptions::default())?;
//! let output = synthesize(&protocol, &table, &CodegenConfig::default(), "expr.yaml", "expr.h")?;
//! assert!(output.header.contains("expr* Lit(YYLTYPE _where, int value);"));
//! # Ok::<(), protogen::Error>(())
//! ```

pub mod arena;
pub mod builder;
pub mod codegen;
pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod resolve;
pub mod schema;

pub use arena::{Arena, ArenaError, ContextLayout, Finalizer, InstanceId};
pub use builder::ProtocolBuilder;
pub use codegen::{synthesize, GeneratedOutput};
pub use config::{CodegenConfig, GeneratorConfig, VoidConstantPolicy};
pub use error::{Error, ErrorClass, Mark, Result};
pub use model::{Element, Field, ImplDescriptor, ImplKind, Method, Protocol};
pub use resolve::{Binding, DispatchTable, Linkage, ResolveOptions, Slot};
