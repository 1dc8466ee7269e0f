//! Template rendering through an external command.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::string::FromUtf8Error;
use std::time::Instant;

/// Renders a template file to HTML.
pub trait Renderer: Send + Sync {
    /// Render the template at `template`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be rendered.
    fn render(&self, template: &Path) -> Result<String, RenderError>;
}

/// Template rendering error.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The render command could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The render command exited unsuccessfully.
    #[error("{program} failed on {} ({status}): {stderr}", template.display())]
    Failed {
        program: String,
        template: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    /// The render command wrote something that is not UTF-8.
    #[error("{program} produced invalid UTF-8 for {}", template.display())]
    Utf8 {
        program: String,
        template: PathBuf,
        #[source]
        source: FromUtf8Error,
    },
}

/// Renderer that runs a program with the template path as its last argument
/// and takes its stdout as the page.
#[derive(Clone, Debug)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    /// Create a renderer for `program` with extra leading arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Renderer for CommandRenderer {
    fn render(&self, template: &Path) -> Result<String, RenderError> {
        let start = Instant::now();

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(template)
            .output()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                program: self.program.clone(),
                template: template.to_path_buf(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let html = String::from_utf8(output.stdout).map_err(|source| RenderError::Utf8 {
            program: self.program.clone(),
            template: template.to_path_buf(),
            source,
        })?;

        tracing::info!(
            template = %template.display(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Rendered"
        );
        Ok(html)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_render_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("index.jinja2");
        std::fs::write(&template, "<body>hello</body>").unwrap();

        let renderer = CommandRenderer::new("cat", Vec::new());

        assert_eq!(renderer.render(&template).unwrap(), "<body>hello</body>");
    }

    #[test]
    fn test_render_passes_leading_args() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("page.jinja2");
        std::fs::write(&template, "x").unwrap();

        let renderer = CommandRenderer::new("echo", vec!["-n".to_owned()]);

        assert_eq!(
            renderer.render(&template).unwrap(),
            template.display().to_string()
        );
    }

    #[test]
    fn test_render_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.jinja2");

        let err = CommandRenderer::new("cat", Vec::new())
            .render(&missing)
            .unwrap_err();

        match err {
            RenderError::Failed { program, stderr, .. } => {
                assert_eq!(program, "cat");
                assert!(stderr.contains("missing.jinja2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_missing_program() {
        let err = CommandRenderer::new("livedev-no-such-renderer", Vec::new())
            .render(Path::new("index.jinja2"))
            .unwrap_err();

        assert!(matches!(err, RenderError::Spawn { .. }));
    }
}
