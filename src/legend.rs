//! Horizontal and vertical choropleth keys.
//!
//! Sizes are estimated with [`crate::text::text_width`]; nothing here measures
//! real glyphs, so labels that would still overflow are squeezed with
//! `textLength`.

use std::cmp::Ordering;

use crate::choropleth::{BreakInfo, Choropleth, MISSING_DATA_TEXT, format_value};
use crate::png::PngConverter;
use crate::svg::escape_xml;
use crate::text::text_width;
use crate::theme::Theme;

pub const HORIZONTAL_KEY_HEIGHT: f64 = 90.0;

const KEY_INSET: f64 = 0.05;
const LABEL_GAP: f64 = 2.0;
/// Bar plus the gaps between it and the labels on either side.
const VERTICAL_BAR_ALLOWANCE: f64 = 36.0;
const VERTICAL_MARGIN: f64 = 10.0;
const SWATCH_ALLOWANCE: f64 = 12.0;

/// Everything a key needs besides its size.
pub struct LegendParams<'a> {
    pub filename: &'a str,
    pub choropleth: &'a Choropleth,
    pub breaks: &'a [BreakInfo],
    pub reference_position: f64,
    pub font_size: f64,
    pub theme: &'a Theme,
    /// Draw the missing-data swatch.
    pub show_missing: bool,
    /// Both orientations are on the page; adds the `_both` class.
    pub both: bool,
    pub responsive: bool,
}

/// A key split into root attributes and inner markup so it can be wrapped in a
/// png fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    pub attributes: String,
    pub content: String,
}

impl Legend {
    pub fn into_svg(self, fallback: Option<&dyn PngConverter>) -> String {
        match fallback {
            Some(converter) => converter.include_fallback_image(&self.attributes, &self.content),
            None => format!("<svg {}>{}</svg>", self.attributes, self.content),
        }
    }
}

impl LegendParams<'_> {
    fn missing_fill(&self, orientation: &str) -> (String, Option<String>) {
        match &self.choropleth.missing_value_colour {
            Some(colour) => (colour.clone(), None),
            None => {
                let id = format!("{}-legend-{orientation}-nodata", self.filename);
                let pattern = self.theme.missing_pattern(&id);
                (format!("url(#{id})"), Some(pattern))
            }
        }
    }

    fn root_attributes(&self, orientation: &str, width: f64, height: f64) -> String {
        let mut class = format!("map_key_{orientation}");
        if self.both {
            class.push_str(&format!(" map_key_{orientation}_both"));
        }
        let size = if self.responsive {
            r#"style="width:100%;""#.to_string()
        } else {
            format!(r#"width="{width}" height="{height}""#)
        };
        format!(
            r#"id="{}-legend-{orientation}-svg" class="{class}" {size} viewBox="0 0 {width} {height}""#,
            self.filename
        )
    }

    fn text(&self, value: &str) -> f64 {
        text_width(value, self.font_size)
    }

    fn tick_label_width(&self) -> f64 {
        self.breaks
            .iter()
            .flat_map(|b| [b.lower_bound, b.upper_bound])
            .map(|v| self.text(&format_value(v)))
            .fold(0.0, f64::max)
    }

    fn reference_label_width(&self) -> f64 {
        if !self.choropleth.has_reference() {
            return 0.0;
        }
        self.text(&self.choropleth.reference_value_text)
            .max(self.text(&format_value(self.choropleth.reference_value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ReferenceLabel {
    /// Tick position relative to the key.
    x: f64,
    text_on_left: bool,
    text_length: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HorizontalLayout {
    left: f64,
    key_width: f64,
    reference: Option<ReferenceLabel>,
}

/// Margins that leave `lhs` units left of the reference tick and `rhs` units
/// right of it, without shrinking the key below `min_key_width`. The tick sits
/// at `left + (width - left - right) * p`.
fn fit_reference(
    width: f64,
    p: f64,
    (mut left, mut right): (f64, f64),
    (lhs, rhs): (f64, f64),
    min_key_width: f64,
) -> (f64, f64) {
    // growing one margin moves the tick, so settle both twice
    for _ in 0..2 {
        if p < 1.0 {
            let needed = (lhs - (width - right) * p) / (1.0 - p);
            let cap = (width - right - min_key_width).max(left);
            left = left.max(needed.min(cap));
        }
        if p > 0.0 {
            let needed = (rhs - (width - left) * (1.0 - p)) / p;
            let cap = (width - left - min_key_width).max(right);
            right = right.max(needed.min(cap));
        }
    }
    (left, right)
}

struct Arrangement {
    left: f64,
    right: f64,
    text_on_left: bool,
    overflow: f64,
}

impl HorizontalLayout {
    fn new(params: &LegendParams<'_>, width: f64) -> Self {
        let inset = width * KEY_INSET;
        let (first, last) = match (params.breaks.first(), params.breaks.last()) {
            (Some(first), Some(last)) => (first.lower_bound, last.upper_bound),
            _ => (0.0, 0.0),
        };
        let left = inset.max(params.text(&format_value(first)) / 2.0 + 1.0);
        let right = inset.max(params.text(&format_value(last)) / 2.0 + 1.0);
        if !params.choropleth.has_reference() {
            return Self {
                left,
                key_width: width - left - right,
                reference: None,
            };
        }

        let min_key_width = width * 0.5;
        let p = params.reference_position.clamp(0.0, 1.0);
        let text_needed = params.text(&params.choropleth.reference_value_text) + LABEL_GAP;
        let value_needed = params.text(&format_value(params.choropleth.reference_value)) + LABEL_GAP;

        let arrange = |text_on_left: bool| {
            let sides = if text_on_left {
                (text_needed, value_needed)
            } else {
                (value_needed, text_needed)
            };
            let (l, r) = fit_reference(width, p, (left, right), sides, min_key_width);
            let tick = l + (width - l - r) * p;
            let overflow = (sides.0 - tick).max(0.0) + (sides.1 - (width - tick)).max(0.0);
            Arrangement {
                left: l,
                right: r,
                text_on_left,
                overflow,
            }
        };
        let text_left = arrange(true);
        let text_right = arrange(false);
        let span = |a: &Arrangement| width - a.left - a.right;
        let chosen = match text_left.overflow.total_cmp(&text_right.overflow) {
            Ordering::Less => text_left,
            Ordering::Greater => text_right,
            Ordering::Equal => match span(&text_left).total_cmp(&span(&text_right)) {
                Ordering::Greater => text_left,
                Ordering::Less => text_right,
                Ordering::Equal if p >= 0.5 => text_left,
                Ordering::Equal => text_right,
            },
        };

        let key_width = span(&chosen);
        let x = key_width * p;
        let tick = chosen.left + x;
        let room = if chosen.text_on_left { tick } else { width - tick };
        let text_length = (text_needed > room).then(|| (room - LABEL_GAP).max(1.0).floor());
        Self {
            left: chosen.left,
            key_width,
            reference: Some(ReferenceLabel {
                x,
                text_on_left: chosen.text_on_left,
                text_length,
            }),
        }
    }
}

/// Key laid out along the width of the map, below or above it.
pub fn horizontal_key(params: &LegendParams<'_>, width: f64) -> Legend {
    let layout = HorizontalLayout::new(params, width);
    let theme = params.theme;
    let f = params.filename;
    let (missing_fill, pattern) = params.missing_fill("horizontal");

    let mut content = String::new();
    if params.show_missing {
        if let Some(pattern) = pattern {
            content.push_str(&format!("\n<defs>{pattern}</defs>"));
        }
    }
    let title = params.choropleth.legend_title();
    let max_title = width - LABEL_GAP;
    let compress = if params.text(&title) > max_title {
        format!(r#" textLength="{max_title}" lengthAdjust="spacingAndGlyphs""#)
    } else {
        String::new()
    };
    content.push_str(&format!("\n<g id=\"{f}-legend-horizontal-container\">"));
    content.push_str(&format!(
        "\n<text x=\"{:.6}\" y=\"6\" dy=\".5em\" style=\"text-anchor: middle;\" class=\"keyText\"{compress}>{}</text>",
        width / 2.0,
        escape_xml(&title)
    ));
    content.push_str(&format!(
        "\n<g id=\"{f}-legend-horizontal-key\" transform=\"translate({:.6}, 20)\">",
        layout.left
    ));

    let mut ticks = String::new();
    let mut position = 0.0;
    for b in params.breaks {
        let segment = b.relative_size * layout.key_width;
        content.push_str(&format!(
            "\n<rect class=\"keyColour\" height=\"8\" width=\"{segment:.6}\" x=\"{position:.6}\" style=\"stroke-width: 0.5; stroke: {}; fill: {};\"></rect>",
            theme.key_border_color, b.colour
        ));
        horizontal_tick(&mut ticks, theme, position, b.lower_bound);
        position += segment;
    }
    if let Some(last) = params.breaks.last() {
        horizontal_tick(&mut ticks, theme, position, last.upper_bound);
    }
    if let Some(reference) = layout.reference {
        horizontal_reference_tick(&mut ticks, params, reference);
    }
    content.push_str(&ticks);
    if params.show_missing {
        missing_swatch(&mut content, theme, &missing_fill, 0.0, 55.0);
    }
    content.push_str("\n</g>\n</g>\n");

    Legend {
        attributes: params.root_attributes("horizontal", width, HORIZONTAL_KEY_HEIGHT),
        content,
    }
}

fn horizontal_tick(out: &mut String, theme: &Theme, x: f64, value: f64) {
    out.push_str(&format!("\n<g class=\"map__tick\" transform=\"translate({x:.6}, 0)\">"));
    out.push_str(&format!(
        "\n<line x2=\"0\" y2=\"15\" style=\"stroke-width: 1; stroke: {};\"></line>",
        theme.tick_color
    ));
    out.push_str(&format!(
        "\n<text x=\"0\" y=\"18\" dy=\".74em\" style=\"text-anchor: middle;\" class=\"keyText\">{}</text>",
        format_value(value)
    ));
    out.push_str("\n</g>");
}

fn horizontal_reference_tick(out: &mut String, params: &LegendParams<'_>, reference: ReferenceLabel) {
    let colour = &params.theme.reference_color;
    let (text_anchor, text_dx, value_anchor, value_dx) = if reference.text_on_left {
        ("end", "-0.1em", "start", "0.1em")
    } else {
        ("start", "0.1em", "end", "-0.1em")
    };
    let compress = reference
        .text_length
        .map(|l| format!(r#" textLength="{l}" lengthAdjust="spacingAndGlyphs""#))
        .unwrap_or_default();
    out.push_str(&format!(
        "\n<g class=\"map__tick\" transform=\"translate({:.6}, 0)\">",
        reference.x
    ));
    out.push_str(&format!(
        "\n<line x2=\"0\" y1=\"8\" y2=\"45\" style=\"stroke-width: 1; stroke: {colour};\"></line>"
    ));
    out.push_str(&format!(
        "\n<text x=\"0\" y=\"33\" dx=\"{text_dx}\" dy=\".74em\" style=\"text-anchor: {text_anchor}; fill: {colour};\" class=\"keyText\"{compress}>{}</text>",
        escape_xml(&params.choropleth.reference_value_text)
    ));
    out.push_str(&format!(
        r#"<text x="0" y="33" dx="{value_dx}" dy=".74em" style="text-anchor: {value_anchor}; fill: {colour};" class="keyText">{}</text>"#,
        format_value(params.choropleth.reference_value)
    ));
    out.push_str("\n</g>");
}

/// Width needed by the vertical key: the widest of the title, the
/// missing-data label and the tick, bar and reference block.
pub fn vertical_key_width(params: &LegendParams<'_>) -> f64 {
    let block = params.tick_label_width() + params.reference_label_width() + VERTICAL_BAR_ALLOWANCE;
    let title = params.text(&params.choropleth.legend_title());
    let missing = if params.show_missing {
        params.text(MISSING_DATA_TEXT) + SWATCH_ALLOWANCE
    } else {
        0.0
    };
    (block.max(title).max(missing) + VERTICAL_MARGIN).ceil()
}

/// Key laid out alongside the map, as tall as the map.
pub fn vertical_key(params: &LegendParams<'_>, height: f64) -> Legend {
    let theme = params.theme;
    let f = params.filename;
    let width = vertical_key_width(params);
    let key_height = height * 0.8;
    let tick_width = params.tick_label_width();
    let block = tick_width + params.reference_label_width() + VERTICAL_BAR_ALLOWANCE;
    let key_x = (width - block - VERTICAL_MARGIN) / 2.0 + VERTICAL_MARGIN / 2.0 + tick_width + 18.0;
    let (missing_fill, pattern) = params.missing_fill("vertical");

    let mut content = String::new();
    if params.show_missing {
        if let Some(pattern) = pattern {
            content.push_str(&format!("\n<defs>{pattern}</defs>"));
        }
    }
    content.push_str(&format!("\n<g id=\"{f}-legend-vertical-container\">"));
    content.push_str(&format!(
        "\n<text x=\"{:.6}\" y=\"{:.6}\" dy=\".5em\" style=\"text-anchor: middle;\" class=\"keyText\">{}</text>",
        width / 2.0,
        height * 0.05,
        escape_xml(&params.choropleth.legend_title())
    ));
    content.push_str(&format!(
        "\n<g id=\"{f}-legend-vertical-key\" transform=\"translate({key_x:.6}, {:.6})\">",
        height * 0.1
    ));

    let mut ticks = String::new();
    let mut position = 0.0;
    for b in params.breaks {
        let segment = b.relative_size * key_height;
        let y = key_height - position;
        content.push_str(&format!(
            "\n<rect class=\"keyColour\" height=\"{segment:.6}\" width=\"8\" y=\"{:.6}\" style=\"stroke-width: 0.5; stroke: {}; fill: {};\"></rect>",
            y - segment,
            theme.key_border_color,
            b.colour
        ));
        vertical_tick(&mut ticks, theme, y, b.lower_bound);
        position += segment;
    }
    if let Some(last) = params.breaks.last() {
        vertical_tick(&mut ticks, theme, key_height - position, last.upper_bound);
    }
    if params.choropleth.has_reference() {
        let p = params.reference_position.clamp(0.0, 1.0);
        vertical_reference_tick(&mut ticks, params, key_height - key_height * p);
    }
    content.push_str(&ticks);
    content.push_str("\n</g>");
    if params.show_missing {
        let x = (width - params.text(MISSING_DATA_TEXT) - SWATCH_ALLOWANCE) / 2.0;
        missing_swatch(&mut content, theme, &missing_fill, x, height * 0.95);
    }
    content.push_str("\n</g>\n");

    Legend {
        attributes: params.root_attributes("vertical", width, height),
        content,
    }
}

fn vertical_tick(out: &mut String, theme: &Theme, y: f64, value: f64) {
    out.push_str(&format!("\n<g class=\"map__tick\" transform=\"translate(0, {y:.6})\">"));
    out.push_str(&format!(
        "\n<line x1=\"8\" x2=\"-15\" style=\"stroke-width: 1; stroke: {};\"></line>",
        theme.tick_color
    ));
    out.push_str(&format!(
        "\n<text x=\"-18\" y=\"0\" dy=\"0.32em\" style=\"text-anchor: end;\" class=\"keyText\">{}</text>",
        format_value(value)
    ));
    out.push_str("\n</g>");
}

fn vertical_reference_tick(out: &mut String, params: &LegendParams<'_>, y: f64) {
    let colour = &params.theme.reference_color;
    out.push_str(&format!("\n<g class=\"map__tick\" transform=\"translate(0, {y:.6})\">"));
    out.push_str(&format!(
        "\n<line x2=\"45\" x1=\"8\" style=\"stroke-width: 1; stroke: {colour};\"></line>"
    ));
    out.push_str(&format!(
        "\n<text x=\"18\" dy=\"-.32em\" style=\"text-anchor: start; fill: {colour};\" class=\"keyText\">{}</text>",
        escape_xml(&params.choropleth.reference_value_text)
    ));
    out.push_str(&format!(
        r#"<text x="18" dy="1em" style="text-anchor: start; fill: {colour};" class="keyText">{}</text>"#,
        format_value(params.choropleth.reference_value)
    ));
    out.push_str("\n</g>");
}

fn missing_swatch(out: &mut String, theme: &Theme, fill: &str, x: f64, y: f64) {
    out.push_str(&format!(
        "\n<g class=\"missingColour\" transform=\"translate({x:.6}, {y:.6})\">"
    ));
    out.push_str(&format!(
        "\n<rect class=\"keyColour\" height=\"8\" width=\"8\" style=\"stroke-width: 0.8; stroke: {}; fill: {fill};\"></rect>",
        theme.key_border_color
    ));
    out.push_str(&format!(
        "\n<text x=\"12\" dy=\".55em\" style=\"text-anchor: start; fill: {};\" class=\"keyText\">{MISSING_DATA_TEXT}</text>",
        theme.reference_color
    ));
    out.push_str("\n</g>");
}
