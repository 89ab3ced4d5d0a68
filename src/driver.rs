//! Pipeline driver
//!
//! Reads a schema document, runs it through building, resolution and
//! synthesis, and writes the two generated files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::builder::ProtocolBuilder;
use crate::codegen::{self, GeneratedOutput};
use crate::config::{GeneratorConfig, OutputConfig};
use crate::error::{Error, Result};
use crate::model::Protocol;
use crate::resolve::{DispatchTable, ResolveOptions};
use crate::schema::YamlEventSource;

/// Where the generated files go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub header: PathBuf,
    pub implementation: PathBuf,
}

impl OutputPaths {
    /// Replace the input's extension with the configured suffixes
    pub fn derive(input: &Path, output: &OutputConfig) -> Self {
        Self {
            header: with_suffix(input, &output.header_suffix),
            implementation: with_suffix(input, &output.impl_suffix),
        }
    }
}

fn with_suffix(input: &Path, suffix: &str) -> PathBuf {
    input.with_extension(suffix.trim_start_matches('.'))
}

/// One run of the generator
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub input: PathBuf,
    /// Overrides the header path
    pub header: Option<PathBuf>,
    /// Overrides the implementation path
    pub output: Option<PathBuf>,
    /// Also write the dispatch table here as JSON
    pub dump_dispatch: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    /// Pick each path from the command line, then the document's
    /// configuration, then derivation from the input path
    pub fn output_paths(&self, protocol: &Protocol, config: &OutputConfig) -> OutputPaths {
        let derived = OutputPaths::derive(&self.input, config);
        OutputPaths {
            header: self
                .header
                .clone()
                .or_else(|| protocol.header_path.as_ref().map(PathBuf::from))
                .unwrap_or(derived.header),
            implementation: self
                .output
                .clone()
                .or_else(|| protocol.impl_path.as_ref().map(PathBuf::from))
                .unwrap_or(derived.implementation),
        }
    }

    /// What the implementation `#include`s: the document's header path as
    /// written when it is in effect, otherwise the header's file name
    pub fn header_include(&self, protocol: &Protocol, paths: &OutputPaths) -> String {
        if self.header.is_none() {
            if let Some(configured) = &protocol.header_path {
                return configured.clone();
            }
        }
        paths
            .header
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| paths.header.display().to_string())
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct Compiled {
    pub protocol: Protocol,
    pub table: DispatchTable,
    pub paths: OutputPaths,
    pub output: GeneratedOutput,
}

/// Parse a document and build its protocol model
pub fn build_protocol(text: &str, config: &GeneratorConfig) -> Result<Protocol> {
    let mut source = YamlEventSource::from_str(text)?;
    ProtocolBuilder::new(config.codegen.padding_type.as_str())?.build(&mut source)
}

/// Run the pipeline on in-memory text without touching the filesystem
pub fn compile(text: &str, options: &RunOptions, config: &GeneratorConfig) -> Result<Compiled> {
    let protocol = build_protocol(text, config)?;
    let table = DispatchTable::resolve(
        &protocol,
        ResolveOptions {
            void_constant: config.resolve.void_constant,
        },
    )?;

    let paths = options.output_paths(&protocol, &config.output);
    let include = options.header_include(&protocol, &paths);
    debug!(
        header = %paths.header.display(),
        implementation = %paths.implementation.display(),
        include = %include,
        "output paths"
    );

    let input_name = options.input.display().to_string();
    let output = codegen::synthesize(&protocol, &table, &config.codegen, &input_name, &include)?;

    Ok(Compiled {
        protocol,
        table,
        paths,
        output,
    })
}

/// Read the input, generate, and write every output file
pub fn run(options: &RunOptions, config: &GeneratorConfig) -> Result<Compiled> {
    let text = fs::read_to_string(&options.input).map_err(|e| Error::io(&options.input, e))?;
    info!(input = %options.input.display(), "generating");

    let compiled = compile(&text, options, config)?;

    write_file(&compiled.paths.header, &compiled.output.header)?;
    write_file(&compiled.paths.implementation, &compiled.output.implementation)?;

    if let Some(path) = &options.dump_dispatch {
        let json = serde_json::to_string_pretty(&compiled.table)?;
        write_file(path, &json)?;
    }

    Ok(compiled)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| Error::io(path, e))?;
    info!(path = %path.display(), bytes = content.len(), "wrote");
    Ok(())
}
