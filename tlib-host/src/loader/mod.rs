//! Loader utilities for tlib-host.
//!
//! Responsibilities:
//! - Read the guest artifact (by default `index.wasm`).
//! - Detect whether the bytes are a `.wasm` binary or `.wat` text.
//! - If it looks like WAT, convert it to WASM bytes (via the `wat` crate).
//! - Compile a Wasmtime `Module` from the resulting WASM bytes.
//!
//! Notes:
//! - Extensions are not trusted; we sniff the bytes themselves.
//! - We accept leading whitespace and a UTF-8 BOM before WAT.

use crate::config::DEFAULT_ARTIFACT;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wasmtime::{Engine, Module};

/// Error returned by loader helpers.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Artifact could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    /// The input was empty or otherwise not recognized as WASM/WAT.
    #[error("unrecognized module format (expected wasm or wat)")]
    UnrecognizedFormat,
    /// WAT parsing failed.
    #[error("failed to parse WAT: {0}")]
    WatParseFailed(#[from] wat::Error),
    /// Wasmtime module compilation failed.
    #[error("failed to compile WASM module: {0}")]
    CompileFailed(String),
}

/// What kind of module the loader inferred from the bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectedFormat {
    Wasm,
    Wat,
}

/// A directory names the artifact it contains (`index.wasm`); anything else is used as-is.
pub fn resolve_artifact(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DEFAULT_ARTIFACT)
    } else {
        path.to_path_buf()
    }
}

/// Read the artifact at `path` and compile it.
pub fn load_module(engine: &Engine, path: &Path) -> Result<Module, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(path = %path.display(), size = bytes.len(), "read guest artifact");
    compile_module(engine, &bytes)
}

/// Load: detect -> (optional) wat->wasm -> compile.
pub fn compile_module(engine: &Engine, bytes: &[u8]) -> Result<Module, LoadError> {
    let Detected { format, wasm_bytes } = normalize_to_wasm(bytes)?;
    tracing::debug!(?format, size = wasm_bytes.len(), "compiling guest module");
    Module::new(engine, wasm_bytes.as_slice()).map_err(|e| LoadError::CompileFailed(e.to_string()))
}

/// Detect format and normalize to valid WASM bytes.
pub fn normalize_to_wasm(bytes: &[u8]) -> Result<Detected, LoadError> {
    let format = detect_format(bytes).ok_or(LoadError::UnrecognizedFormat)?;

    match format {
        DetectedFormat::Wasm => Ok(Detected {
            format,
            wasm_bytes: bytes.to_vec(),
        }),
        DetectedFormat::Wat => Ok(Detected {
            format,
            wasm_bytes: wat::parse_bytes(bytes)?.into_owned(),
        }),
    }
}

/// Result of normalizing (detecting + possibly converting) the input.
#[derive(Clone, Debug)]
pub struct Detected {
    pub format: DetectedFormat,
    /// Always valid WASM bytes (for WASM/WAT inputs).
    pub wasm_bytes: Vec<u8>,
}

/// Best-effort detection.
///
/// Rules:
/// - If the first 4 bytes are `\0asm`, treat as WASM.
/// - Else, after stripping UTF-8 BOM / leading whitespace, if the first non-ws byte is `(`,
///   treat as WAT (common WAT starts with `(module ...)`).
pub fn detect_format(bytes: &[u8]) -> Option<DetectedFormat> {
    if is_wasm_magic(bytes) {
        return Some(DetectedFormat::Wasm);
    }

    let i = skip_bom_and_leading_ws(bytes);
    if i < bytes.len() && bytes[i] == b'(' {
        return Some(DetectedFormat::Wat);
    }

    None
}

fn is_wasm_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(b"\0asm")
}

fn skip_bom_and_leading_ws(bytes: &[u8]) -> usize {
    let mut i = 0;

    // UTF-8 BOM: EF BB BF
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        i = 3;
    }

    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\r' | b'\n') {
        i += 1;
    }

    i
}
