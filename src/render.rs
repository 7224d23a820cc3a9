use std::collections::HashSet;
use std::sync::Arc;

use crate::RenderOptions;
use crate::choropleth::{BreakInfo, assign_colours_and_titles, sorted_break_info};
use crate::legend::{LegendParams, horizontal_key, vertical_key, vertical_key_width};
use crate::png::PngConverter;
use crate::projection::Projection;
use crate::request::RenderRequest;
use crate::svg::{DrawOptions, SvgCanvas};
use crate::topology::decode;

/// Class given to every map region.
pub const REGION_CLASS: &str = "mapRegion";

/// Everything the map and its keys share for one request, computed once.
pub struct SvgRequest<'a> {
    pub request: &'a RenderRequest,
    options: &'a RenderOptions,
    canvas: Option<SvgCanvas>,
    pub view_box_width: f64,
    pub view_box_height: f64,
    pub vertical_legend_width: f64,
    pub responsive: bool,
    pub include_fallback_png: bool,
    has_missing_data: bool,
    font_size: f64,
    breaks: Vec<BreakInfo>,
    reference_position: f64,
}

impl<'a> SvgRequest<'a> {
    pub fn prepare(request: &'a RenderRequest, options: &'a RenderOptions) -> Self {
        let canvas = prepare_canvas(request);
        let view_box_width = if request.width > 0.0 {
            request.width
        } else {
            options.default_width
        };
        let view_box_height = canvas.as_ref().map_or(view_box_width, |canvas| {
            canvas.height_for_width(view_box_width, Projection::Mercator)
        });
        let font_size = if request.font_size > 0.0 {
            request.font_size
        } else {
            options.theme.font_size
        };
        let (breaks, reference_position) = request
            .active_choropleth()
            .map_or((Vec::new(), 0.0), |c| sorted_break_info(c, &request.data));
        let has_missing_data = match (&canvas, request.active_choropleth()) {
            (Some(canvas), Some(_)) => count_missing(canvas, request) > 0,
            _ => false,
        };

        let mut prepared = Self {
            request,
            options,
            canvas,
            view_box_width,
            view_box_height,
            vertical_legend_width: 0.0,
            responsive: request.is_responsive(),
            include_fallback_png: request.include_fallback_png,
            has_missing_data,
            font_size,
            breaks,
            reference_position,
        };
        if request.has_vertical_legend() {
            let width = prepared
                .legend_params()
                .map_or(0.0, |params| vertical_key_width(&params));
            prepared.vertical_legend_width = width;
        }
        prepared
    }

    /// True when there is geometry to draw.
    pub fn has_map(&self) -> bool {
        self.canvas.is_some()
    }

    pub fn has_missing_data(&self) -> bool {
        self.has_missing_data
    }

    pub fn png_converter(&self) -> Option<&Arc<dyn PngConverter>> {
        self.options.png_converter.as_ref()
    }

    fn fallback_converter(&self) -> Option<Arc<dyn PngConverter>> {
        if self.include_fallback_png {
            self.options.png_converter.clone()
        } else {
            None
        }
    }

    fn id_prefix(&self) -> String {
        format!("{}-", self.request.filename)
    }

    fn legend_params(&self) -> Option<LegendParams<'_>> {
        let choropleth = self.request.active_choropleth()?;
        if self.canvas.is_none() || self.breaks.is_empty() {
            return None;
        }
        Some(LegendParams {
            filename: &self.request.filename,
            choropleth,
            breaks: &self.breaks,
            reference_position: self.reference_position,
            font_size: self.font_size,
            theme: &self.options.theme,
            show_missing: self.has_missing_data,
            both: self.request.has_horizontal_legend() && self.request.has_vertical_legend(),
            responsive: self.responsive,
        })
    }
}

/// Decodes the topology, assigns prefixed ids and the region class. `None` when
/// there is nothing to draw.
fn prepare_canvas(request: &RenderRequest) -> Option<SvgCanvas> {
    let geography = request.geography.as_ref()?;
    let topology = geography.topojson.as_ref()?;
    if topology.is_empty() {
        return None;
    }
    let mut collection = match decode(topology) {
        Ok(collection) => collection,
        Err(err) => {
            tracing::error!(error = %err, filename = %request.filename, "unable to decode topology");
            return None;
        }
    };
    if collection.is_empty() {
        return None;
    }

    let prefix = format!("{}-", request.filename);
    for (index, feature) in collection.features.iter_mut().enumerate() {
        let id = feature
            .property_text(&geography.id_property)
            .filter(|id| !id.is_empty())
            .or_else(|| feature.id.clone().filter(|id| !id.is_empty()))
            .unwrap_or_else(|| format!("feature_{index}"));
        feature.id = Some(format!("{prefix}{id}"));
        feature.prepend_property("class", REGION_CLASS);
    }

    let mut canvas = SvgCanvas::new();
    canvas.append_feature_collection(collection);
    Some(canvas)
}

fn count_missing(canvas: &SvgCanvas, request: &RenderRequest) -> usize {
    let ids: HashSet<String> = request
        .data
        .iter()
        .map(|row| format!("{}-{}", request.filename, row.id))
        .collect();
    canvas
        .features()
        .iter()
        .filter(|f| f.id.as_ref().is_none_or(|id| !ids.contains(id)))
        .count()
}

/// The map itself, coloured by the choropleth when there is one. Empty when the
/// request has no drawable geography.
pub fn render_svg(svg_request: &SvgRequest<'_>) -> String {
    let Some(canvas) = &svg_request.canvas else {
        return String::new();
    };
    let request = svg_request.request;
    let f = &request.filename;
    let (width, height) = (svg_request.view_box_width, svg_request.view_box_height);
    let name_property = request
        .geography
        .as_ref()
        .map_or("", |g| g.name_property.as_str());

    let mut options = DrawOptions::default()
        .with_projection(Projection::Mercator)
        .use_properties(["style", "class"])
        .with_ids()
        .with_attribute("id", format!("{f}-map-svg"))
        .with_attribute("viewBox", format!("0 0 {width} {height}"))
        .responsive(svg_request.responsive)
        .with_png_fallback(svg_request.fallback_converter());
    if !name_property.is_empty() {
        options = options.with_titles(name_property);
    }

    let Some(choropleth) = request.active_choropleth() else {
        return canvas.draw(width, height, &options);
    };

    let pattern_id = format!("{f}-nodata");
    let missing_style = match &choropleth.missing_value_colour {
        Some(colour) => format!("fill: {colour};"),
        None => format!("fill: url(#{pattern_id});"),
    };
    if svg_request.has_missing_data && choropleth.missing_value_colour.is_none() {
        options = options.with_pattern(svg_request.options.theme.missing_pattern(&pattern_id));
    }

    let mut styled = canvas.clone();
    styled.restyle(|features| {
        assign_colours_and_titles(
            features,
            choropleth,
            &request.data,
            &svg_request.id_prefix(),
            name_property,
            &missing_style,
        );
    });
    styled.draw(width, height, &options)
}

/// Key drawn beside the map, as tall as the map's view box.
pub fn render_vertical_key(svg_request: &SvgRequest<'_>) -> String {
    let Some(params) = svg_request.legend_params() else {
        return String::new();
    };
    vertical_key(&params, svg_request.view_box_height)
        .into_svg(svg_request.fallback_converter().as_deref())
}

/// Key drawn above or below the map, as wide as the map's view box.
pub fn render_horizontal_key(svg_request: &SvgRequest<'_>) -> String {
    let Some(params) = svg_request.legend_params() else {
        return String::new();
    };
    horizontal_key(&params, svg_request.view_box_width)
        .into_svg(svg_request.fallback_converter().as_deref())
}
