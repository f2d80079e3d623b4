use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use crate::diagnostics::parse_output;
use crate::document::SourceDocument;
use crate::error::{ConfigError, ToolInvocationError};
use crate::resolver::{resolve_all, ResolvedDiagnostic};
use crate::settings::{Settings, ShaderSpec, ToolSource};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Finds the validator binary and knows how to launch it.
#[derive(Debug)]
pub struct ToolLocator {
    program: PathBuf,
    install_dir: PathBuf,
    args: Vec<String>,
    fix_permissions: bool,
    permission_checked: OnceLock<()>,
}

impl ToolLocator {
    /// Bundled binary for the running platform.
    pub fn bundled(install_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::bundled_for_platform(install_dir, std::env::consts::OS)
    }

    pub fn bundled_for_platform(
        install_dir: impl Into<PathBuf>,
        platform: &str,
    ) -> Result<Self, ConfigError> {
        let binary = match platform {
            "linux" => "essl_to_glsl_linux",
            "macos" => "essl_to_glsl_osx",
            "windows" => "shader.exe",
            other => return Err(ConfigError::UnsupportedPlatform(other.to_string())),
        };

        let install_dir = install_dir.into();
        Ok(Self {
            program: install_dir.join(binary),
            install_dir,
            args: Vec::new(),
            fix_permissions: true,
            permission_checked: OnceLock::new(),
        })
    }

    /// A program chosen by the user; it is launched from its own directory.
    pub fn explicit(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        let install_dir = program
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            program,
            install_dir,
            args,
            fix_permissions: false,
            permission_checked: OnceLock::new(),
        }
    }

    pub fn from_source(source: &ToolSource) -> Result<Self, ConfigError> {
        match source {
            ToolSource::Bundled { install_dir } => Self::bundled(install_dir),
            ToolSource::Explicit { program, args } => Ok(Self::explicit(program, args.clone())),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    // AIDEV-NOTE: Package managers drop the exec bit on the bundled binaries; restore it once
    pub fn ensure_executable(&self) {
        if !self.fix_permissions {
            return;
        }
        self.permission_checked.get_or_init(|| {
            if let Err(e) = set_executable(&self.program) {
                tracing::warn!(
                    program = %self.program.display(),
                    "could not mark validator tool executable: {e}"
                );
            }
        });
    }

    fn command(&self, filename: Option<&Path>, spec: ShaderSpec) -> Command {
        let mut command = Command::new(&self.program);
        command
            .current_dir(&self.install_dir)
            .args(&self.args)
            .args(spec.tool_args())
            .arg(filename.map_or(OsStr::new(""), Path::as_os_str));
        command
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

struct ToolOutput {
    text: String,
    status: ExitStatus,
}

/// Runs one validation pass against the external tool.
#[derive(Debug)]
pub struct ValidationRunner {
    tool: ToolLocator,
    spec: ShaderSpec,
    timeout: Option<Duration>,
}

impl ValidationRunner {
    pub fn new(tool: ToolLocator, spec: ShaderSpec) -> Self {
        Self {
            tool,
            spec,
            timeout: Some(crate::settings::DEFAULT_TIMEOUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let tool = ToolLocator::from_source(&settings.tool)?;
        Ok(Self::new(tool, settings.spec).with_timeout(settings.timeout))
    }

    pub fn tool(&self) -> &ToolLocator {
        &self.tool
    }

    /// Validate `document`, blocking until the tool exits or times out.
    pub fn run(
        &self,
        filename: Option<&Path>,
        document: &SourceDocument,
    ) -> Result<Vec<ResolvedDiagnostic>, ToolInvocationError> {
        if document.is_empty() {
            return Ok(Vec::new());
        }

        let output = self.invoke(filename, document.text())?;
        let diagnostics = parse_output(&output.text, document)?;

        // A silent crash reads as a clean compile; only the log tells
        if !output.status.success() && diagnostics.is_empty() {
            tracing::warn!(
                status = %output.status,
                "validator tool exited unsuccessfully without diagnostics"
            );
        }

        Ok(resolve_all(&diagnostics, document))
    }

    fn invoke(
        &self,
        filename: Option<&Path>,
        text: &str,
    ) -> Result<ToolOutput, ToolInvocationError> {
        self.tool.ensure_executable();

        // One pipe for both streams keeps diagnostics in the order the tool printed them
        let (output, output_writer) = io::pipe()?;
        let mut command = self.tool.command(filename, self.spec);
        command
            .stdin(Stdio::piped())
            .stdout(output_writer.try_clone()?)
            .stderr(output_writer);

        tracing::debug!(program = %self.tool.program.display(), "launching validator tool");
        let spawned = command.spawn();
        // Command keeps our copies of the write end; EOF only arrives once they are closed
        drop(command);
        let mut child = spawned.map_err(|source| match source.kind() {
            io::ErrorKind::PermissionDenied => ToolInvocationError::PermissionDenied {
                detail: source.to_string(),
            },
            _ => ToolInvocationError::Spawn {
                program: self.tool.program.clone(),
                source,
            },
        })?;

        let Some(stdin) = child.stdin.take() else {
            abort(&mut child);
            return Err(io::Error::other("failed to open validator tool input").into());
        };

        // Writer runs on its own thread so a chatty tool can't deadlock on a full pipe
        let input = text.to_owned();
        let writer = thread::spawn(move || write_input(stdin, &input));

        let (sender, receiver) = flume::bounded(1);
        spawn_reader(output, sender);

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let received = match deadline {
            Some(deadline) => receiver.recv_deadline(deadline),
            None => receiver
                .recv()
                .map_err(|_| flume::RecvTimeoutError::Disconnected),
        };

        let text = match received {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                abort(&mut child);
                return Err(e.into());
            }
            Err(flume::RecvTimeoutError::Timeout) => return Err(self.timed_out(&mut child)),
            Err(flume::RecvTimeoutError::Disconnected) => {
                abort(&mut child);
                return Err(io::Error::other("validator output reader stopped").into());
            }
        };

        // Closing the output early doesn't mean the tool is done
        let status = match deadline {
            Some(deadline) => match wait_until(&mut child, deadline)? {
                Some(status) => status,
                None => return Err(self.timed_out(&mut child)),
            },
            None => child.wait()?,
        };

        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(io::Error::other("validator input writer panicked").into()),
        }

        tracing::debug!(%status, bytes = text.len(), "validator tool finished");
        Ok(ToolOutput { text, status })
    }

    fn timed_out(&self, child: &mut Child) -> ToolInvocationError {
        abort(child);
        let timeout = self.timeout.unwrap_or_default();
        tracing::warn!(?timeout, "validator tool timed out, killed");
        ToolInvocationError::TimedOut(timeout)
    }
}

fn write_input(mut stdin: ChildStdin, text: &str) -> io::Result<()> {
    match stdin.write_all(text.as_bytes()) {
        // Tool exited without reading everything; its output still counts
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::trace!("validator tool closed its input early");
            Ok(())
        }
        other => other,
    }
    // stdin drops here, which signals end of input
}

fn spawn_reader<R>(mut reader: R, sender: flume::Sender<io::Result<String>>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let result = reader
            .read_to_end(&mut bytes)
            .map(|_| String::from_utf8_lossy(&bytes).into_owned());
        let _ = sender.send(result);
    });
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn abort(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Span;

    #[cfg(unix)]
    fn sh_tool(script: &str) -> ValidationRunner {
        let tool = ToolLocator::explicit(
            "/bin/sh",
            vec!["-c".to_string(), script.to_string(), "glsv-test".to_string()],
        );
        ValidationRunner::new(tool, ShaderSpec::Essl)
    }

    fn shader_with_foo_on_line_five() -> SourceDocument {
        SourceDocument::new(
            "precision mediump float;\n\
             uniform float time;\n\
             \n\
             void main() {\n\
             \x20   gl_FragColor = vec4(foo);\n\
             }\n",
        )
    }

    #[test]
    fn test_bundled_binary_per_platform() {
        let linux = ToolLocator::bundled_for_platform("/opt/glsv", "linux").unwrap();
        assert_eq!(linux.program(), Path::new("/opt/glsv/essl_to_glsl_linux"));
        assert_eq!(linux.install_dir(), Path::new("/opt/glsv"));

        let mac = ToolLocator::bundled_for_platform("/opt/glsv", "macos").unwrap();
        assert_eq!(mac.program(), Path::new("/opt/glsv/essl_to_glsl_osx"));

        let windows = ToolLocator::bundled_for_platform("C:/glsv", "windows").unwrap();
        assert_eq!(windows.program(), Path::new("C:/glsv/shader.exe"));

        assert!(matches!(
            ToolLocator::bundled_for_platform("/opt/glsv", "plan9"),
            Err(ConfigError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_explicit_tool_runs_from_its_directory() {
        let tool = ToolLocator::explicit("/usr/local/bin/validator", Vec::new());
        assert_eq!(tool.install_dir(), Path::new("/usr/local/bin"));

        let bare = ToolLocator::explicit("validator", Vec::new());
        assert_eq!(bare.install_dir(), Path::new("."));
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_fix_runs_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("essl_to_glsl_linux");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();

        let tool = ToolLocator::bundled_for_platform(dir.path(), "linux").unwrap();
        tool.ensure_executable();
        let mode = std::fs::metadata(&binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();
        tool.ensure_executable();
        let mode = std::fs::metadata(&binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_empty_document_skips_the_tool() {
        let tool = ToolLocator::explicit("/nonexistent/glsv/tool", Vec::new());
        let runner = ValidationRunner::new(tool, ShaderSpec::Essl);
        let result = runner.run(None, &SourceDocument::new(""));
        assert_eq!(result.unwrap(), Vec::new());
    }

    #[test]
    fn test_missing_tool_is_invocation_error() {
        let tool = ToolLocator::explicit("/nonexistent/glsv/tool", Vec::new());
        let runner = ValidationRunner::new(tool, ShaderSpec::Essl);
        let result = runner.run(None, &SourceDocument::new("void main() {}\n"));
        assert!(matches!(
            result,
            Err(ToolInvocationError::Spawn { .. })
                | Err(ToolInvocationError::PermissionDenied { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_undeclared_identifier_resolves_to_token() {
        let runner = sh_tool(
            r#"cat >/dev/null; echo "shader.frag:5:0: error: 'foo' : undeclared identifier""#,
        );
        let doc = shader_with_foo_on_line_five();

        let resolved = runner.run(Some(Path::new("shader.frag")), &doc).unwrap();

        assert_eq!(resolved.len(), 1);
        let start = doc.text().find("foo").unwrap();
        assert_eq!(resolved[0].span, Span::new(start, start + 3));
        assert_eq!(resolved[0].line_index, 4);
        assert_eq!(resolved[0].message, "undeclared identifier");
    }

    #[cfg(unix)]
    #[test]
    fn test_source_is_streamed_on_stdin() {
        let runner = sh_tool(r#"awk 'END { print "in.frag:1:0: error: " NR " lines" }'"#);
        let doc = SourceDocument::new("a\nb\nc\n");

        let resolved = runner.run(None, &doc).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].message, "3 lines");
    }

    #[cfg(unix)]
    #[test]
    fn test_filename_is_passed_as_argument() {
        let runner = sh_tool(r#"cat >/dev/null; echo "x:1:0: error: name=[$1]""#);
        let doc = SourceDocument::new("void main() {}\n");

        let saved = runner.run(Some(Path::new("/tmp/a.frag")), &doc).unwrap();
        assert_eq!(saved[0].message, "name=[/tmp/a.frag]");

        let unsaved = runner.run(None, &doc).unwrap();
        assert_eq!(unsaved[0].message, "name=[]");
    }

    #[cfg(unix)]
    #[test]
    fn test_comment_only_output_is_clean() {
        let runner = sh_tool("cat >/dev/null; echo '#### lines ####'");
        let resolved = runner.run(None, &shader_with_foo_on_line_five()).unwrap();
        assert!(resolved.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_denied_on_stderr_fails_the_run() {
        let runner = sh_tool(
            r#"cat >/dev/null; echo "a:1:0: error: 'x' : bad"; echo "sh: ./essl_to_glsl_linux: Permission denied" >&2"#,
        );
        let result = runner.run(None, &shader_with_foo_on_line_five());
        assert!(matches!(
            result,
            Err(ToolInvocationError::PermissionDenied { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_crash_reads_as_clean() {
        // Exits without reading stdin, so the writer may also hit a broken pipe
        let runner = sh_tool("exit 3");
        let big = "float x;\n".repeat(50_000);
        let resolved = runner.run(None, &SourceDocument::new(big)).unwrap();
        assert!(resolved.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_out_of_range_line_is_dropped() {
        let runner = sh_tool(
            r#"cat >/dev/null; echo "a:9999:0: error: 'x' : far"; echo "a:1:0: error: '' : near""#,
        );
        let doc = SourceDocument::new("1\n2\n3\n4\n5\n6\n7\n8\n9\n10");
        let resolved = runner.run(None, &doc).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].message, "near");
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_tool_times_out() {
        let runner = sh_tool("exec sleep 5").with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let result = runner.run(None, &SourceDocument::new("void main() {}\n"));

        assert!(matches!(result, Err(ToolInvocationError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_that_closes_output_still_times_out() {
        let runner = sh_tool("cat >/dev/null; exec 1>&- 2>&-; sleep 4")
            .with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let result = runner.run(None, &SourceDocument::new("void main() {}\n"));

        assert!(matches!(result, Err(ToolInvocationError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_and_stdout_keep_print_order() {
        let runner = sh_tool(
            r#"cat >/dev/null; echo "a:2:0: error: 'b' : printed first" >&2; sleep 0.2; echo "a:1:0: error: 'a' : printed second""#,
        );
        let doc = SourceDocument::new("a\nb\n");

        let resolved = runner.run(None, &doc).unwrap();
        let messages: Vec<&str> = resolved.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["printed first", "printed second"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_are_idempotent() {
        let runner = sh_tool(
            r#"cat >/dev/null; echo "a:5:0: error: 'foo' : undeclared identifier"; echo "a:2:0: warning: 'time' : unused""#,
        );
        let doc = shader_with_foo_on_line_five();

        let first = runner.run(Some(Path::new("a.frag")), &doc).unwrap();
        let second = runner.run(Some(Path::new("a.frag")), &doc).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }
}
