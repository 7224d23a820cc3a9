use crate::RenderOptions;
use crate::png::{ExecutableConverter, PngConverter};
use crate::theme::Theme;
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// View box width used when a request does not set one.
    pub default_width: f64,
    /// Legend font size when a request does not set one; falls back to the theme.
    pub font_size: Option<f64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_width: 400.0,
            font_size: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngMode {
    /// Png output and fallback images are unavailable.
    #[cfg_attr(not(feature = "png"), default)]
    None,
    /// Rasterize in-process with resvg.
    #[cfg_attr(feature = "png", default)]
    Resvg,
    /// Run an external program such as rsvg-convert or inkscape.
    Executable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PngConfig {
    pub mode: PngMode,
    pub executable: Option<PathBuf>,
    /// May contain the `<SVG>` and `<PNG>` placeholders.
    pub arguments: Vec<String>,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
}

impl Default for PngConfig {
    fn default() -> Self {
        Self {
            mode: PngMode::default(),
            executable: None,
            arguments: Vec::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub theme: Theme,
    pub render: RenderConfig,
    pub png: PngConfig,
}

impl Config {
    /// Options for the render functions, with the configured png converter.
    pub fn render_options(&self) -> anyhow::Result<RenderOptions> {
        let mut theme = self.theme.clone();
        if let Some(size) = self.render.font_size {
            theme.font_size = size;
        }
        Ok(RenderOptions {
            theme,
            default_width: self.render.default_width,
            png_converter: self.png_converter()?,
        })
    }

    fn png_converter(&self) -> anyhow::Result<Option<Arc<dyn PngConverter>>> {
        match self.png.mode {
            PngMode::None => Ok(None),
            PngMode::Resvg => resvg_converter(),
            PngMode::Executable => {
                let executable = self
                    .png
                    .executable
                    .clone()
                    .ok_or_else(|| anyhow!("png mode 'executable' requires pngExecutable"))?;
                let timeout =
                    (self.png.timeout_secs > 0).then(|| Duration::from_secs(self.png.timeout_secs));
                let converter = ExecutableConverter::new(executable, self.png.arguments.clone())
                    .with_timeout(timeout);
                Ok(Some(Arc::new(converter)))
            }
        }
    }
}

#[cfg(feature = "png")]
fn resvg_converter() -> anyhow::Result<Option<Arc<dyn PngConverter>>> {
    Ok(Some(Arc::new(crate::png::ResvgConverter::new())))
}

#[cfg(not(feature = "png"))]
fn resvg_converter() -> anyhow::Result<Option<Arc<dyn PngConverter>>> {
    Err(anyhow!("png mode 'resvg' requires the `png` feature"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_size: Option<f64>,
    tick_color: Option<String>,
    reference_color: Option<String>,
    key_border_color: Option<String>,
    missing_pattern_background: Option<String>,
    missing_pattern_stripe: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    default_width: Option<f64>,
    font_size: Option<f64>,
    png_mode: Option<PngMode>,
    png_executable: Option<PathBuf>,
    png_arguments: Option<Vec<String>>,
    png_timeout_secs: Option<u64>,
}

/// Defaults, overridden by the camelCase JSON (or JSON5) file at `path`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let parsed: ConfigFile = json5::from_str(&contents)
        .with_context(|| format!("parsing config {}", path.display()))?;

    if let Some(name) = parsed.theme.as_deref() {
        config.theme = Theme::by_name(name).ok_or_else(|| anyhow!("unknown theme '{name}'"))?;
    }

    if let Some(vars) = parsed.theme_variables {
        if let Some(v) = vars.font_size {
            config.theme.font_size = v;
        }
        if let Some(v) = vars.tick_color {
            config.theme.tick_color = v;
        }
        if let Some(v) = vars.reference_color {
            config.theme.reference_color = v;
        }
        if let Some(v) = vars.key_border_color {
            config.theme.key_border_color = v;
        }
        if let Some(v) = vars.missing_pattern_background {
            config.theme.missing_pattern_background = v;
        }
        if let Some(v) = vars.missing_pattern_stripe {
            config.theme.missing_pattern_stripe = v;
        }
    }

    if let Some(v) = parsed.default_width {
        config.render.default_width = v;
    }
    if parsed.font_size.is_some() {
        config.render.font_size = parsed.font_size;
    }
    if let Some(v) = parsed.png_mode {
        config.png.mode = v;
    }
    if parsed.png_executable.is_some() {
        config.png.executable = parsed.png_executable;
    }
    if let Some(v) = parsed.png_arguments {
        config.png.arguments = v;
    }
    if let Some(v) = parsed.png_timeout_secs {
        config.png.timeout_secs = v;
    }

    Ok(config)
}
