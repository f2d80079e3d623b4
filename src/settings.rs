use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::cli::Cli;
use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WORKERS: usize = 2;

/// Shading language spec the tool should validate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ShaderSpec {
    /// OpenGL ES shading language (the tool's default)
    #[default]
    Essl,
    /// WebGL 1.0
    Webgl,
}

impl ShaderSpec {
    // AIDEV-NOTE: Default spec adds nothing so the plain `<tool> "<filename>"` protocol is kept
    pub fn tool_args(self) -> &'static [&'static str] {
        match self {
            ShaderSpec::Essl => &[],
            ShaderSpec::Webgl => &["-s=w"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    /// Platform binary shipped inside `install_dir`
    Bundled { install_dir: PathBuf },
    /// User supplied program, run from its own directory
    Explicit { program: PathBuf, args: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub enabled: bool,
    pub spec: ShaderSpec,
    pub tool: ToolSource,
    pub timeout: Option<Duration>,
    pub workers: usize,
}

impl Settings {
    pub fn new(tool: ToolSource) -> Self {
        Self {
            enabled: true,
            spec: ShaderSpec::default(),
            tool,
            timeout: Some(DEFAULT_TIMEOUT),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let tool = match (&cli.tool, &cli.tool_dir) {
            (Some(program), _) => ToolSource::Explicit {
                program: program.clone(),
                args: Vec::new(),
            },
            (None, Some(install_dir)) => ToolSource::Bundled {
                install_dir: install_dir.clone(),
            },
            (None, None) => ToolSource::Bundled {
                install_dir: default_tool_dir()?,
            },
        };

        // 0 means "wait forever", matching the tool's historical behaviour
        let timeout = match cli.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            enabled: !cli.disable,
            spec: cli.spec,
            timeout,
            workers: cli.workers.max(1),
            ..Self::new(tool)
        })
    }
}

fn default_tool_dir() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(|_| ConfigError::MissingToolDir)?;
    exe.parent()
        .map(|dir| dir.to_path_buf())
        .ok_or(ConfigError::MissingToolDir)
}
