//! SVG to PNG conversion.
//!
//! Converters return the PNG base64-encoded, ready to be embedded in a
//! `data:image/png;base64,` URL.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{MapError, Result};

/// Replaced by the path of the svg file to convert.
pub const ARG_SVG_FILENAME: &str = "<SVG>";
/// Replaced by the path of the png file the executable must write.
pub const ARG_PNG_FILENAME: &str = "<PNG>";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const UNSUPPORTED_BROWSER: &str = "<p>Unsupported Browser</p>";

pub trait PngConverter: Send + Sync {
    /// Converts an svg document into a base64-encoded png.
    fn convert(&self, svg: &[u8]) -> Result<Vec<u8>>;

    /// Wraps `content` in a `<switch>` that falls back to a png rendering of the
    /// same svg for browsers without svg support.
    fn include_fallback_image(&self, attributes: &str, content: &str) -> String {
        let svg = format!("<svg {attributes}>{content}\n</svg>");
        let fallback = match self.convert(svg.as_bytes()) {
            Ok(png) => format!(
                r#"<img alt="Fallback map image for older browsers" src="data:image/png;base64,{}" />"#,
                String::from_utf8_lossy(&png)
            ),
            Err(err) => {
                tracing::error!(error = %err, "unable to include fallback png");
                UNSUPPORTED_BROWSER.to_string()
            }
        };
        format!(
            "<svg {attributes}>\n\t<switch>\n\t\t<g>\n{content}\n\t\t</g>\n\t\t<foreignObject>{fallback}</foreignObject>\n\t</switch>\n</svg>"
        )
    }
}

/// Runs an external program (inkscape, rsvg-convert, ...) against temporary files.
#[derive(Debug, Clone)]
pub struct ExecutableConverter {
    executable: PathBuf,
    arguments: Vec<String>,
    timeout: Option<Duration>,
}

impl ExecutableConverter {
    /// `arguments` should mention [`ARG_SVG_FILENAME`] and [`ARG_PNG_FILENAME`].
    pub fn new(executable: impl Into<PathBuf>, arguments: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            arguments,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, dir: &tempfile::TempDir, svg: &[u8]) -> Result<Vec<u8>> {
        let svg_path = dir.path().join("map.svg");
        let png_path = dir.path().join("map.png");
        std::fs::write(&svg_path, svg)?;

        let svg_arg = svg_path.to_string_lossy();
        let png_arg = png_path.to_string_lossy();
        let args: Vec<String> = self
            .arguments
            .iter()
            .map(|a| {
                a.replace(ARG_SVG_FILENAME, &svg_arg)
                    .replace(ARG_PNG_FILENAME, &png_arg)
            })
            .collect();

        tracing::debug!(executable = %self.executable.display(), ?args, "converting svg to png");
        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => {
                let started = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if started.elapsed() >= timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(MapError::ConverterTimeout {
                            executable: self.executable.clone(),
                            timeout,
                        });
                    }
                    thread::sleep(Duration::from_millis(10));
                }
            }
        };

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(MapError::ConverterFailed {
                executable: self.executable.clone(),
                status,
                stderr,
            });
        }

        let png = std::fs::read(&png_path)?;
        Ok(STANDARD.encode(png).into_bytes())
    }
}

impl PngConverter for ExecutableConverter {
    fn convert(&self, svg: &[u8]) -> Result<Vec<u8>> {
        let dir = tempfile::Builder::new().prefix("map-render").tempdir()?;
        let result = self.run(&dir, svg);
        let path = dir.path().to_path_buf();
        if let Err(err) = dir.close() {
            tracing::debug!(error = %err, path = %path.display(), "unable to delete temporary files");
        }
        if let Err(err) = &result {
            tracing::error!(error = %err, "svg to png conversion failed");
        }
        result
    }
}

/// Rasterizes in-process with resvg.
#[cfg(feature = "png")]
pub struct ResvgConverter {
    fontdb: std::sync::Arc<usvg::fontdb::Database>,
}

#[cfg(feature = "png")]
impl ResvgConverter {
    pub fn new() -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        Self {
            fontdb: std::sync::Arc::new(fontdb),
        }
    }

    /// Renders to raw png bytes.
    pub fn render(&self, svg: &str) -> Result<Vec<u8>> {
        let mut opt = usvg::Options::default();
        opt.fontdb = self.fontdb.clone();

        let svg = with_svg_namespace(svg);
        let tree = usvg::Tree::from_str(&svg, &opt).map_err(|e| MapError::Rasterize(e.to_string()))?;
        let size = tree.size().to_int_size();
        let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
            .ok_or_else(|| MapError::Rasterize("failed to allocate pixmap".to_string()))?;
        resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap.as_mut());
        pixmap
            .encode_png()
            .map_err(|e| MapError::Rasterize(e.to_string()))
    }
}

#[cfg(feature = "png")]
impl Default for ResvgConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "png")]
impl PngConverter for ResvgConverter {
    fn convert(&self, svg: &[u8]) -> Result<Vec<u8>> {
        let svg = std::str::from_utf8(svg).map_err(|e| MapError::Rasterize(e.to_string()))?;
        let png = self.render(svg).inspect_err(|err| {
            tracing::error!(error = %err, "svg to png conversion failed");
        })?;
        Ok(STANDARD.encode(png).into_bytes())
    }
}

/// usvg only accepts documents in the svg namespace; the renderers emit bare `<svg>`.
#[cfg_attr(not(feature = "png"), allow(dead_code))]
fn with_svg_namespace(svg: &str) -> std::borrow::Cow<'_, str> {
    let Some(start) = svg.find("<svg") else {
        return svg.into();
    };
    let tag_end = svg[start..].find('>').map_or(svg.len(), |i| start + i);
    if svg[start..tag_end].contains("xmlns=") {
        return svg.into();
    }
    let insert_at = start + "<svg".len();
    format!(
        r#"{} xmlns="http://www.w3.org/2000/svg"{}"#,
        &svg[..insert_at],
        &svg[insert_at..]
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl PngConverter for Failing {
        fn convert(&self, _svg: &[u8]) -> Result<Vec<u8>> {
            Err(MapError::Rasterize("boom".to_string()))
        }
    }

    #[test]
    fn failed_fallback_uses_placeholder() {
        let svg = Failing.include_fallback_image(r#"width="1" height="1""#, "\n<g></g>");
        assert_eq!(
            svg,
            "<svg width=\"1\" height=\"1\">\n\t<switch>\n\t\t<g>\n\n<g></g>\n\t\t</g>\n\t\t<foreignObject><p>Unsupported Browser</p></foreignObject>\n\t</switch>\n</svg>"
        );
    }

    #[test]
    fn namespace_is_added_once() {
        let svg = with_svg_namespace(r#"<svg width="1"><g/></svg>"#);
        assert_eq!(svg, r#"<svg xmlns="http://www.w3.org/2000/svg" width="1"><g/></svg>"#);
        let again = with_svg_namespace(&svg);
        assert_eq!(again, svg);
    }

    #[test]
    fn missing_executable_is_an_error() {
        let converter = ExecutableConverter::new(
            "/nonexistent/map-render-converter",
            vec![ARG_SVG_FILENAME.to_string(), ARG_PNG_FILENAME.to_string()],
        );
        assert!(matches!(converter.convert(b"<svg/>"), Err(MapError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn executable_output_is_base64_encoded() {
        let converter = ExecutableConverter::new(
            "sh",
            vec!["-c".to_string(), format!("echo \"test\" >> {ARG_PNG_FILENAME}")],
        );
        let png = converter.convert(b"<svg/>").unwrap();
        assert_eq!(png, b"dGVzdAo=");
        let wrapped = converter.include_fallback_image("", "");
        assert!(wrapped.contains(
            r#"<img alt="Fallback map image for older browsers" src="data:image/png;base64,dGVzdAo=" />"#
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failing_executable_reports_stderr() {
        let converter = ExecutableConverter::new(
            "sh",
            vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()],
        );
        match converter.convert(b"<svg/>") {
            Err(MapError::ConverterFailed { stderr, .. }) => assert_eq!(stderr.trim(), "broken"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn slow_executable_times_out() {
        let converter = ExecutableConverter::new("sh", vec!["-c".to_string(), "sleep 5".to_string()])
            .with_timeout(Some(Duration::from_millis(100)));
        assert!(matches!(
            converter.convert(b"<svg/>"),
            Err(MapError::ConverterTimeout { .. })
        ));
    }

    #[cfg(feature = "png")]
    #[test]
    fn resvg_renders_png_signature() {
        let converter = ResvgConverter::new();
        let png = converter
            .render(r#"<svg width="10" height="10"><rect width="10" height="10" fill="red"/></svg>"#)
            .unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
