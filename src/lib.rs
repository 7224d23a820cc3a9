pub mod choropleth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod html;
pub mod legend;
pub mod png;
pub mod projection;
pub mod render;
pub mod request;
pub mod svg;
pub mod text;
pub mod theme;
pub mod topology;

#[cfg(feature = "cli")]
pub use cli::run;
pub use error::{MapError, Result};
pub use html::{render_html_with_png, render_html_with_svg};
pub use render::{SvgRequest, render_horizontal_key, render_svg, render_vertical_key};
pub use request::RenderRequest;

use std::sync::Arc;

use crate::png::PngConverter;
use crate::theme::Theme;

/// Settings shared by every render, independent of the request.
#[derive(Clone)]
pub struct RenderOptions {
    pub theme: Theme,
    /// View box width for requests that do not set one.
    pub default_width: f64,
    /// Used for png output and fallback images; both degrade gracefully when absent.
    pub png_converter: Option<Arc<dyn PngConverter>>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            default_width: 400.0,
            png_converter: None,
        }
    }
}
