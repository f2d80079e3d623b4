use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;

use crate::settings::ShaderSpec;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    glsv shader.frag                          # Validate once with the bundled tool
    glsv --watch shader.frag                  # Re-validate whenever the file changes
    glsv --spec webgl effect.frag             # Validate against the WebGL spec
    cat shader.vert | glsv -                  # Validate an unsaved buffer from stdin
    glsv --tool ./essl_to_glsl_linux a.vert   # Use an explicit tool binary")]
pub struct Cli {
    /// Path to the GLSL/ESSL shader file, or `-` to read from stdin
    pub shader_file: PathBuf,

    /// Directory holding the bundled essl_to_glsl binaries
    #[arg(long, value_name = "DIR", env = "GLSV_TOOL_DIR")]
    pub tool_dir: Option<PathBuf>,

    /// Explicit validator binary, overrides platform selection
    #[arg(long, value_name = "PATH", env = "GLSV_TOOL")]
    pub tool: Option<PathBuf>,

    /// Shading language spec to validate against
    #[arg(long, value_enum, default_value_t = ShaderSpec::Essl)]
    pub spec: ShaderSpec,

    /// Seconds to wait for the tool before giving up (0 waits forever)
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub timeout: u64,

    /// Number of background validation workers
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub workers: usize,

    /// Keep running and re-validate on every change to the file
    #[arg(short, long)]
    pub watch: bool,

    /// Skip validation entirely
    #[arg(long)]
    pub disable: bool,

    /// Cursor position; the status line shows the error under it
    #[arg(long, value_name = "LINE:COL", value_parser = parse_cursor)]
    pub at: Option<CursorPosition>,
}

/// 1-based line and column, as editors display them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: usize,
    pub column: usize,
}

fn parse_cursor(value: &str) -> Result<CursorPosition, String> {
    let (line, column) = value.split_once(':').ok_or("expected LINE:COL")?;
    let line = line
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or("LINE must be a number starting at 1")?;
    let column = column
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or("COL must be a number starting at 1")?;
    Ok(CursorPosition { line, column })
}

impl Cli {
    /// Name of the document as passed to the tool; `None` for an unsaved buffer.
    pub fn document_path(&self) -> Option<&PathBuf> {
        if self.reads_stdin() {
            None
        } else {
            Some(&self.shader_file)
        }
    }

    pub fn reads_stdin(&self) -> bool {
        self.shader_file.as_os_str() == "-"
    }

    pub fn load_source(&self) -> Result<String, Box<dyn std::error::Error>> {
        if self.reads_stdin() {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            return Ok(source);
        }

        match fs::read_to_string(&self.shader_file) {
            Ok(content) => Ok(content),
            Err(e) => Err(format!(
                "Error reading shader file '{}': {}",
                self.shader_file.display(),
                e
            )
            .into()),
        }
    }
}
