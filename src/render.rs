//! Bundle-file writing and external renderer invocation (`spec.md` §6).
//!
//! The compiler itself never touches audio; it hands a bundle file to a
//! separate offline synthesis process and waits for it to exit.

use crate::error::{CompileError, CompileResult};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Renderer invocation settings, loadable from a TOML config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub renderer_path: String,
    pub sample_rate: u32,
    pub header_format: String,
    pub sample_format: String,
    pub server_options: Vec<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            renderer_path: "scsynth".to_string(),
            sample_rate: 44_100,
            header_format: "aiff".to_string(),
            sample_format: "int24".to_string(),
            server_options: Vec::new(),
        }
    }
}

impl RenderOptions {
    pub fn from_toml(text: &str) -> CompileResult<Self> {
        toml::from_str(text).map_err(|e| CompileError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))
    }
}

/// Writes a compiled bundle-file datagram to `path`.
pub fn write_bundle_file(path: &Path, datagram: &[u8]) -> CompileResult<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(datagram)?;
    Ok(())
}

/// Compiles `session`, writes the bundle file, and invokes the external
/// renderer against it; the placeholder for "no input audio" is `_`
/// (`spec.md` §6).
#[tracing::instrument(skip(session, options))]
pub fn render(
    session: &mut Session,
    duration: Option<f64>,
    bundle_path: &Path,
    input_audio: Option<&Path>,
    output_path: &Path,
    options: &RenderOptions,
) -> CompileResult<()> {
    let datagram = session.to_datagram(duration)?;
    write_bundle_file(bundle_path, &datagram)?;

    let renderer = which(&options.renderer_path).ok_or_else(|| CompileError::RendererNotFound(options.renderer_path.clone()))?;

    let input_arg = input_audio.map(|p| p.display().to_string()).unwrap_or_else(|| "_".to_string());

    let mut command = Command::new(renderer);
    command
        .arg("-N")
        .arg(bundle_path)
        .arg(input_arg)
        .arg(output_path)
        .arg(options.sample_rate.to_string())
        .arg(&options.header_format)
        .arg(&options.sample_format)
        .args(&options.server_options);

    tracing::debug!(?command, "invoking renderer");
    let status = command.status()?;
    if !status.success() {
        return Err(CompileError::RendererFailed(status));
    }
    Ok(())
}

fn which(program: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(program);
    if direct.is_file() {
        return Some(direct);
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).map(|dir| dir.join(program)).find(|candidate| candidate.is_file())
    })
}
