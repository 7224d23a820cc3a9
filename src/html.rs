//! HTML `<figure>` around the map: caption, keys, responsive CSS and footer.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::RenderOptions;
use crate::choropleth::LegendPosition;
use crate::png::PngConverter;
use crate::render::{SvgRequest, render_horizontal_key, render_svg, render_vertical_key};
use crate::request::RenderRequest;
use crate::svg::escape_xml;

const SOURCE_TEXT: &str = "Source: ";
const NOTES_TEXT: &str = "Notes";
const FOOTNOTE_HIDDEN_TEXT: &str = "Footnote ";

static FOOTNOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([0-9]+)\]").unwrap());
static WIDTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"width="[^"]*""#).unwrap());
static HEIGHT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"height="[^"]+""#).unwrap());

/// Markup for the pieces inside the map container.
struct Slots {
    css: String,
    map: String,
    vertical: Option<String>,
    horizontal: Option<String>,
}

/// Figure with the map and keys inlined as svg, plus responsive CSS.
pub fn render_html_with_svg(request: &RenderRequest, options: &RenderOptions) -> String {
    let svg_request = SvgRequest::prepare(request, options);
    let slots = Slots {
        css: render_css(&svg_request),
        map: format!("\n{}\n", render_svg(&svg_request)),
        vertical: request
            .has_vertical_legend()
            .then(|| format!("\n{}\n", render_vertical_key(&svg_request))),
        horizontal: request
            .has_horizontal_legend()
            .then(|| format!("\n{}\n", render_horizontal_key(&svg_request))),
    };
    render_figure(request, &slots)
}

/// Figure with png images in place of the svgs. The layout is fixed-size and
/// carries a single key, the vertical one when both are configured.
pub fn render_html_with_png(request: &RenderRequest, options: &RenderOptions) -> String {
    let mut svg_request = SvgRequest::prepare(request, options);
    svg_request.responsive = false;
    svg_request.include_fallback_png = false;
    let converter = svg_request.png_converter();

    let vertical = request
        .has_vertical_legend()
        .then(|| render_png(render_vertical_key(&svg_request), converter));
    let horizontal = (request.has_horizontal_legend() && vertical.is_none())
        .then(|| render_png(render_horizontal_key(&svg_request), converter));
    let slots = Slots {
        css: String::new(),
        map: render_png(render_svg(&svg_request), converter),
        vertical,
        horizontal,
    };
    render_figure(request, &slots)
}

fn id_prefix(request: &RenderRequest) -> String {
    format!("map-{}", request.filename)
}

fn render_figure(request: &RenderRequest, slots: &Slots) -> String {
    let prefix = id_prefix(request);
    let mut out = String::new();
    out.push_str(&format!("<figure class=\"figure\" id=\"{prefix}-figure\">\n"));

    if !request.title.is_empty() || !request.subtitle.is_empty() {
        out.push_str(&format!(
            r#"<figcaption class="map__caption">{}"#,
            parse_value(request, &request.title)
        ));
        if !request.subtitle.is_empty() {
            out.push_str(&format!(
                r#"<br /><span class="map__subtitle">{}</span>"#,
                parse_value(request, &request.subtitle)
            ));
        }
        out.push_str("</figcaption>\n");
    }

    out.push_str(r#"<div class="map_container">"#);
    out.push_str(&slots.css);
    write_map_divs(&mut out, request, slots);
    out.push_str("</div>");

    write_footer(&mut out, request);
    out.push_str("</figure>\n");
    out
}

fn write_map_divs(out: &mut String, request: &RenderRequest, slots: &Slots) {
    let prefix = id_prefix(request);
    let vertical = |out: &mut String| {
        if let Some(key) = &slots.vertical {
            out.push_str(&format!(
                r#"<div id="{prefix}-legend-vertical" class="map_key map_key__vertical">{key}</div>"#
            ));
        }
    };
    let horizontal = |out: &mut String| {
        if let Some(key) = &slots.horizontal {
            out.push_str(&format!(
                r#"<div id="{prefix}-legend-horizontal" class="map_key map_key__horizontal">{key}</div>"#
            ));
        }
    };

    if request.horizontal_legend_position() == LegendPosition::Before {
        horizontal(out);
    }
    if request.vertical_legend_position() == LegendPosition::Before {
        vertical(out);
    }
    out.push_str(&format!(r#"<div id="{prefix}-map" class="map">{}</div>"#, slots.map));
    if request.vertical_legend_position() == LegendPosition::After {
        vertical(out);
    }
    if request.horizontal_legend_position() == LegendPosition::After {
        horizontal(out);
    }
}

fn write_footer(out: &mut String, request: &RenderRequest) {
    out.push_str("<footer class=\"figure__footer\">\n");
    if !request.licence.is_empty() {
        out.push_str(&format!(
            "<p class=\"figure__licence\">{}</p>\n",
            escape_xml(&request.licence)
        ));
    }
    if !request.source.is_empty() {
        let source = if request.source_link.is_empty() {
            escape_xml(&request.source)
        } else {
            format!(
                r#"<a href="{}">{}</a>"#,
                escape_xml(&request.source_link),
                escape_xml(&request.source)
            )
        };
        out.push_str(&format!("<p class=\"figure__source\">{SOURCE_TEXT}{source}</p>\n"));
    }
    if !request.footnotes.is_empty() {
        let prefix = id_prefix(request);
        out.push_str(&format!("<p class=\"figure__notes\">{NOTES_TEXT}</p>\n"));
        out.push_str("<ol class=\"figure__footnotes\">\n");
        for (i, note) in request.footnotes.iter().enumerate() {
            out.push_str(&format!(
                "<li id=\"{prefix}-note-{}\" class=\"figure__footnote-item\">{}</li>\n",
                i + 1,
                parse_value(request, note)
            ));
        }
        out.push_str("</ol>\n");
    }
    out.push_str("</footer>\n");
}

/// Escapes `value`, turns newlines into `<br />` and `[n]` into a link to
/// footnote `n` when such a footnote exists.
fn parse_value(request: &RenderRequest, value: &str) -> String {
    let escaped = escape_xml(value).replace('\n', "<br />");
    if request.footnotes.is_empty() {
        return escaped;
    }
    let prefix = id_prefix(request);
    let count = request.footnotes.len();
    FOOTNOTE_RE
        .replace_all(&escaped, |caps: &regex::Captures<'_>| {
            match caps[1].parse::<usize>() {
                Ok(n) if (1..=count).contains(&n) => format!(
                    r##"<a href="#{prefix}-note-{n}" class="footnote__link"><span class="visuallyhidden">{FOOTNOTE_HIDDEN_TEXT}</span>{n}</a>"##
                ),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Sizes the map and switches between the keys by viewport width.
fn render_css(svg_request: &SvgRequest<'_>) -> String {
    let request = svg_request.request;
    let id = id_prefix(request);
    let view_box_width = svg_request.view_box_width;
    let mut css = String::from("\n<style type=\"text/css\">");

    css.push_str(&format!("\n\t#{id}-map, #{id}-legend-horizontal {{"));
    if svg_request.responsive {
        css.push_str(&format!("\n\t\tmin-width: {:.0}px;", request.min_width));
        css.push_str(&format!("\n\t\tmax-width: {:.0}px;", request.max_width));
    } else {
        css.push_str(&format!("\n\t\twidth: {view_box_width:.0}px;"));
    }
    css.push_str("\n\t}");

    if request.has_vertical_legend() {
        let total = view_box_width + svg_request.vertical_legend_width;
        let map_percent = (view_box_width / total * 100.0).floor();
        let legend_percent = 100.0 - map_percent - 1.0;
        let legend_max_width = request.max_width.max(view_box_width) / map_percent * legend_percent;

        if request.has_horizontal_legend() && svg_request.responsive {
            css.push_str(&format!("\n\t@media (min-width: {:.0}px) {{", total + 1.0));
            css.push_str(&format!("\n\t\t#{id}-legend-horizontal {{ display: none;}}"));
            css.push_str(&format!(
                "\n\t\t#{id}-map {{ display: inline-block; width: {map_percent:.0}%;}}"
            ));
            css.push_str(&format!(
                "\n\t\t#{id}-legend-vertical {{ display: inline-block; width: {legend_percent:.0}%; max-width: {legend_max_width:.0}px;}}"
            ));
            css.push_str("\n\t}");

            css.push_str(&format!("\n\t@media (max-width: {total:.0}px) {{"));
            css.push_str(&format!("\n\t\t#{id}-legend-vertical {{ display: none;}}"));
            css.push_str(&format!("\n\t\t#{id}-map {{ width: 100%;}}"));
            css.push_str("\n\t}");
        } else {
            css.push_str(&format!(
                "\n\t#{id}-map {{ display: inline-block; width: {map_percent:.0}%;}}"
            ));
            css.push_str(&format!(
                "\n\t#{id}-legend-vertical {{ display: inline-block; width: {legend_percent:.0}%; max-width: {legend_max_width:.0}px;}}"
            ));
        }
    }

    css.push_str("\n</style>\n");
    css
}

/// Replaces an svg with a png `<img>` of the same size, or returns the svg
/// unchanged when it cannot be converted.
fn render_png(svg: String, converter: Option<&Arc<dyn PngConverter>>) -> String {
    if svg.is_empty() {
        return svg;
    }
    let Some(converter) = converter else {
        tracing::error!("no png converter configured, cannot convert svg to png");
        return svg;
    };
    match converter.convert(svg.as_bytes()) {
        Ok(png) => {
            let width = WIDTH_RE.find(&svg).map_or("", |m| m.as_str());
            let height = HEIGHT_RE.find(&svg).map_or("", |m| m.as_str());
            format!(
                r#"<img {width} {height} src="data:image/png;base64,{}" />"#,
                String::from_utf8_lossy(&png)
            )
        }
        Err(err) => {
            tracing::error!(error = %err, "unable to convert svg to png");
            svg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choropleth::{Choropleth, ChoroplethBreak, DataRow};
    use crate::error::{MapError, Result};
    use crate::request::Geography;
    use crate::topology::Topology;

    const TWO_SQUARES: &str = r#"{"type":"Topology","objects":{"regions":{"type":"GeometryCollection","geometries":[{"type":"Polygon","arcs":[[0,1]],"properties":{"code":"a","name":"West"}},{"type":"Polygon","arcs":[[2,-1]],"properties":{"code":"b","name":"East"}}]}},"arcs":[[[1,0],[1,1]],[[1,1],[0,1],[0,0],[1,0]],[[1,0],[2,0],[2,1],[1,1]]]}"#;

    struct FixedPng;

    impl PngConverter for FixedPng {
        fn convert(&self, _svg: &[u8]) -> Result<Vec<u8>> {
            Ok(b"UE5H".to_vec())
        }
    }

    struct BrokenPng;

    impl PngConverter for BrokenPng {
        fn convert(&self, _svg: &[u8]) -> Result<Vec<u8>> {
            Err(MapError::Rasterize("no backend".to_string()))
        }
    }

    fn request(horizontal: LegendPosition, vertical: LegendPosition) -> RenderRequest {
        RenderRequest {
            title: "Title [1]".to_string(),
            subtitle: "Line one\nLine two".to_string(),
            source: "Office".to_string(),
            source_link: "https://example.org".to_string(),
            licence: "Open licence".to_string(),
            filename: "abc".to_string(),
            footnotes: vec!["First".to_string(), "Second\nnote".to_string()],
            geography: Some(Geography {
                topojson: Some(Topology::from_json(TWO_SQUARES.as_bytes()).unwrap()),
                id_property: "code".to_string(),
                name_property: "name".to_string(),
            }),
            data: vec![DataRow {
                id: "a".to_string(),
                value: 3.0,
            }],
            choropleth: Some(Choropleth {
                breaks: vec![
                    ChoroplethBreak {
                        lower_bound: 0.0,
                        colour: "red".to_string(),
                    },
                    ChoroplethBreak {
                        lower_bound: 5.0,
                        colour: "blue".to_string(),
                    },
                ],
                upper_bound: 10.0,
                horizontal_legend_position: horizontal,
                vertical_legend_position: vertical,
                ..Choropleth::default()
            }),
            ..RenderRequest::default()
        }
    }

    fn position(html: &str, needle: &str) -> usize {
        html.find(needle)
            .unwrap_or_else(|| panic!("{needle} not found in {html}"))
    }

    #[test]
    fn figure_has_caption_and_footer() {
        let html = render_html_with_svg(
            &request(LegendPosition::None, LegendPosition::None),
            &RenderOptions::default(),
        );
        assert!(html.starts_with("<figure class=\"figure\" id=\"map-abc-figure\">\n"));
        assert!(html.contains(
            r##"<figcaption class="map__caption">Title <a href="#map-abc-note-1" class="footnote__link"><span class="visuallyhidden">Footnote </span>1</a><br /><span class="map__subtitle">Line one<br />Line two</span></figcaption>"##
        ));
        assert!(html.contains(r#"<p class="figure__licence">Open licence</p>"#));
        assert!(html.contains(
            r#"<p class="figure__source">Source: <a href="https://example.org">Office</a></p>"#
        ));
        assert!(html.contains(r#"<p class="figure__notes">Notes</p>"#));
        assert!(html.contains(
            r#"<li id="map-abc-note-2" class="figure__footnote-item">Second<br />note</li>"#
        ));
        assert!(html.ends_with("</footer>\n</figure>\n"));
    }

    #[test]
    fn unknown_footnote_numbers_stay_text() {
        let request = request(LegendPosition::None, LegendPosition::None);
        assert_eq!(parse_value(&request, "see [3]"), "see [3]");
        assert_eq!(parse_value(&request, "a < b"), "a &lt; b");
    }

    #[test]
    fn empty_footer_sections_are_omitted() {
        let mut request = request(LegendPosition::None, LegendPosition::None);
        request.licence.clear();
        request.source_link.clear();
        request.footnotes.clear();
        let html = render_html_with_svg(&request, &RenderOptions::default());
        assert!(!html.contains("figure__licence"));
        assert!(!html.contains("figure__notes"));
        assert!(html.contains(r#"<p class="figure__source">Source: Office</p>"#));
        assert!(html.contains("Title [1]"));
    }

    #[test]
    fn legends_follow_their_positions() {
        let html = render_html_with_svg(
            &request(LegendPosition::Before, LegendPosition::After),
            &RenderOptions::default(),
        );
        let horizontal = position(&html, r#"<div id="map-abc-legend-horizontal""#);
        let map = position(&html, r#"<div id="map-abc-map" class="map">"#);
        let vertical = position(&html, r#"<div id="map-abc-legend-vertical""#);
        assert!(horizontal < map && map < vertical);

        let html = render_html_with_svg(
            &request(LegendPosition::After, LegendPosition::Before),
            &RenderOptions::default(),
        );
        let horizontal = position(&html, r#"<div id="map-abc-legend-horizontal""#);
        let map = position(&html, r#"<div id="map-abc-map" class="map">"#);
        let vertical = position(&html, r#"<div id="map-abc-legend-vertical""#);
        assert!(vertical < map && map < horizontal);
    }

    #[test]
    fn map_without_choropleth_has_no_keys() {
        let mut request = request(LegendPosition::Before, LegendPosition::Before);
        request.choropleth = None;
        let html = render_html_with_svg(&request, &RenderOptions::default());
        assert!(html.contains(r#"<div id="map-abc-map" class="map">"#));
        assert!(html.contains(r#"<svg width="400""#));
        assert!(!html.contains("legend-vertical\""));
        assert!(!html.contains("map_key"));
    }

    #[test]
    fn fixed_width_css() {
        let html = render_html_with_svg(
            &request(LegendPosition::None, LegendPosition::None),
            &RenderOptions::default(),
        );
        assert!(html.contains(
            "\n<style type=\"text/css\">\n\t#map-abc-map, #map-abc-legend-horizontal {\n\t\twidth: 400px;\n\t}\n</style>\n"
        ));
    }

    #[test]
    fn responsive_css_switches_legends() {
        let mut request = request(LegendPosition::After, LegendPosition::After);
        request.min_width = 300.0;
        request.max_width = 500.0;
        let options = RenderOptions::default();
        let prepared = SvgRequest::prepare(&request, &options);
        let switch = 400.0 + prepared.vertical_legend_width;

        let html = render_html_with_svg(&request, &options);
        assert!(html.contains("\t\tmin-width: 300px;\n\t\tmax-width: 500px;"));
        assert!(html.contains(&format!("@media (min-width: {:.0}px)", switch + 1.0)));
        assert!(html.contains(&format!("@media (max-width: {switch:.0}px)")));
        assert!(html.contains("#map-abc-legend-horizontal { display: none;}"));
        assert!(html.contains("#map-abc-legend-vertical { display: none;}"));
    }

    #[test]
    fn vertical_only_css_sets_widths() {
        let html = render_html_with_svg(
            &request(LegendPosition::None, LegendPosition::After),
            &RenderOptions::default(),
        );
        assert!(!html.contains("@media"));
        assert!(html.contains("\n\t#map-abc-map { display: inline-block; width: "));
    }

    #[test]
    fn png_figure_uses_images_and_one_key() {
        let options = RenderOptions {
            png_converter: Some(Arc::new(FixedPng)),
            ..RenderOptions::default()
        };
        let html = render_html_with_png(
            &request(LegendPosition::Before, LegendPosition::After),
            &options,
        );
        assert!(!html.contains("<style"));
        assert!(!html.contains("<svg"));
        assert!(html.contains(
            r#"<div id="map-abc-map" class="map"><img width="400" height="#
        ));
        assert!(html.contains(r#"src="data:image/png;base64,UE5H" />"#));
        assert!(html.contains(r#"<div id="map-abc-legend-vertical""#));
        assert!(!html.contains("legend-horizontal"));
    }

    #[test]
    fn png_figure_keeps_horizontal_key_alone() {
        let options = RenderOptions {
            png_converter: Some(Arc::new(FixedPng)),
            ..RenderOptions::default()
        };
        let html = render_html_with_png(
            &request(LegendPosition::After, LegendPosition::None),
            &options,
        );
        assert!(html.contains(
            r#"<div id="map-abc-legend-horizontal" class="map_key map_key__horizontal"><img width="400" height="90" src="data:image/png;base64,UE5H" /></div>"#
        ));
    }

    #[test]
    fn png_figure_falls_back_to_svg() {
        let request = request(LegendPosition::None, LegendPosition::None);
        let html = render_html_with_png(&request, &RenderOptions::default());
        assert!(html.contains(r#"<div id="map-abc-map" class="map"><svg width="400""#));

        let options = RenderOptions {
            png_converter: Some(Arc::new(BrokenPng)),
            ..RenderOptions::default()
        };
        let html = render_html_with_png(&request, &options);
        assert!(html.contains(r#"<div id="map-abc-map" class="map"><svg width="400""#));
        assert!(!html.contains("<img"));
    }
}
