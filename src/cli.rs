use crate::config::load_config;
use crate::html::{render_html_with_png, render_html_with_svg};
use crate::render::{SvgRequest, render_svg};
use crate::request::RenderRequest;
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, ValueEnum};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "mapr", version, about = "Render TopoJSON choropleth maps as SVG, HTML or PNG")]
pub struct Args {
    /// Render request (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout except for PNG.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "html")]
    pub output_format: OutputFormat,

    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// View box width, overriding the request
    #[arg(short = 'w', long = "width")]
    pub width: Option<f64>,

    /// Only check the request for missing mandatory fields
    #[arg(long = "validate")]
    pub validate: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// HTML figure with inline svg
    Html,
    /// HTML figure with png images
    HtmlPng,
    /// The map alone
    Svg,
    /// The map alone, rasterized
    Png,
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let options = config.render_options()?;

    let body = read_input(args.input.as_deref())?;
    let mut request = RenderRequest::from_slice(&body).context("invalid render request")?;
    if args.validate {
        request.validate()?;
        eprintln!("request is valid");
        return Ok(());
    }
    if let Some(width) = args.width {
        request.width = width;
    }

    match args.output_format {
        OutputFormat::Html => {
            let html = render_html_with_svg(&request, &options);
            write_output(html.as_bytes(), args.output.as_deref())
        }
        OutputFormat::HtmlPng => {
            let html = render_html_with_png(&request, &options);
            write_output(html.as_bytes(), args.output.as_deref())
        }
        OutputFormat::Svg => {
            let svg = render_svg(&SvgRequest::prepare(&request, &options));
            write_output(svg.as_bytes(), args.output.as_deref())
        }
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            let converter = options
                .png_converter
                .clone()
                .ok_or_else(|| anyhow::anyhow!("PNG output requires a png converter (pngMode)"))?;
            let mut svg_request = SvgRequest::prepare(&request, &options);
            svg_request.responsive = false;
            svg_request.include_fallback_png = false;
            let svg = render_svg(&svg_request);
            if svg.is_empty() {
                return Err(anyhow::anyhow!("request has no geography to render"));
            }
            let encoded = converter.convert(svg.as_bytes())?;
            let png = STANDARD
                .decode(&encoded)
                .context("converter returned invalid base64")?;
            write_output(&png, Some(&output))
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return std::fs::read(path).with_context(|| format!("reading {}", path.display()));
        }
    }
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
}

fn write_output(bytes: &[u8], path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "mapr",
            "-i",
            "request.json",
            "-e",
            "html-png",
            "-w",
            "640",
            "--validate",
        ])
        .unwrap();
        assert_eq!(args.output_format, OutputFormat::HtmlPng);
        assert_eq!(args.width, Some(640.0));
        assert!(args.validate);
        assert_eq!(args.input.as_deref(), Some(Path::new("request.json")));
    }

    #[test]
    fn png_needs_an_output_path() {
        assert!(ensure_output(&None, "png").is_err());
        let path = PathBuf::from("map.png");
        assert_eq!(ensure_output(&Some(path.clone()), "png").unwrap(), path);
    }

    #[test]
    fn writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.svg");
        write_output(b"<svg/>", Some(&path)).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<svg/>");
    }
}
