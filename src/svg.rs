//! SVG markup for decoded geometry.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::geometry::{Feature, FeatureCollection, Geometry, Position};
use crate::png::PngConverter;
use crate::projection::{BoundingBox, Padding, Projection, ScaleFunction, height_for_width};

/// Options for a single [`SvgCanvas::draw`] call.
#[derive(Clone)]
pub struct DrawOptions {
    pub projection: Projection,
    pub padding: Padding,
    /// Extra attributes on the root element; emitted sorted by name.
    pub attributes: BTreeMap<String, String>,
    /// Feature properties copied onto the element as attributes.
    pub use_properties: Vec<String>,
    pub with_ids: bool,
    pub title_property: Option<String>,
    /// Fragments placed inside `<defs>`, usually `<pattern>` elements.
    pub patterns: Vec<String>,
    /// Drops the fixed size so the image scales to its container.
    pub responsive: bool,
    pub png_fallback: Option<Arc<dyn PngConverter>>,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            projection: Projection::Identity,
            padding: Padding::default(),
            attributes: BTreeMap::new(),
            use_properties: vec!["class".to_string()],
            with_ids: false,
            title_property: None,
            patterns: Vec::new(),
            responsive: false,
            png_fallback: None,
        }
    }
}

impl DrawOptions {
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn use_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.use_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_ids(mut self) -> Self {
        self.with_ids = true;
        self
    }

    pub fn with_titles(mut self, property: impl Into<String>) -> Self {
        self.title_property = Some(property.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn responsive(mut self, responsive: bool) -> Self {
        self.responsive = responsive;
        self
    }

    pub fn with_png_fallback(mut self, converter: Option<Arc<dyn PngConverter>>) -> Self {
        self.png_fallback = converter;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Extent {
    bounds: Option<BoundingBox>,
    points: usize,
}

/// Collects geometry and draws it scaled to fit the requested size.
#[derive(Debug, Clone, Default)]
pub struct SvgCanvas {
    elements: Vec<Feature>,
    // one slot per projection, reset whenever geometry is appended
    extents: [OnceCell<Extent>; 2],
}

impl SvgCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_geometry(&mut self, geometry: Geometry) {
        self.append_feature(Feature::new(geometry));
    }

    pub fn append_feature(&mut self, feature: Feature) {
        self.elements.push(feature);
        self.extents = Default::default();
    }

    pub fn append_feature_collection(&mut self, collection: FeatureCollection) {
        self.elements.extend(collection.features);
        self.extents = Default::default();
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn features(&self) -> &[Feature] {
        &self.elements
    }

    /// Edits feature properties in place. Geometry must not change, since the
    /// cached extents are kept.
    pub(crate) fn restyle(&mut self, style: impl FnOnce(&mut [Feature])) {
        style(&mut self.elements);
    }

    fn extent(&self, projection: Projection) -> Extent {
        let slot = match projection {
            Projection::Identity => 0,
            Projection::Mercator => 1,
        };
        *self.extents[slot].get_or_init(|| {
            let positions = self.positions();
            Extent {
                bounds: BoundingBox::from_positions(projection, positions.iter().copied()),
                points: positions.len(),
            }
        })
    }

    fn positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        for feature in &self.elements {
            feature.geometry.for_each_position(&mut |p| out.push(p));
        }
        out
    }

    /// Projected bounds of everything appended so far.
    pub fn bounding_box(&self, projection: Projection) -> Option<BoundingBox> {
        self.extent(projection).bounds
    }

    pub fn height_for_width(&self, width: f64, projection: Projection) -> f64 {
        height_for_width(width, self.bounding_box(projection).as_ref())
    }

    pub fn draw(&self, width: f64, height: f64, options: &DrawOptions) -> String {
        let extent = self.extent(options.projection);
        let scale = ScaleFunction::new(
            width,
            height,
            options.padding,
            extent.bounds,
            extent.points,
            options.projection,
        );

        let mut content = String::new();
        if !options.patterns.is_empty() {
            content.push_str("\n<defs>");
            for pattern in &options.patterns {
                content.push_str(pattern);
            }
            content.push_str("</defs>");
        }
        for feature in &self.elements {
            let attributes = feature_attributes(feature, options);
            let title = options
                .title_property
                .as_deref()
                .and_then(|p| feature.property_text(p));
            content.push('\n');
            write_geometry(&mut content, &scale, &feature.geometry, &attributes, title.as_deref());
        }

        let attributes = root_attributes(width, height, options);
        match &options.png_fallback {
            Some(converter) => converter.include_fallback_image(&attributes, &content),
            None => format!("<svg {attributes}>{content}\n</svg>"),
        }
    }
}

fn root_attributes(width: f64, height: f64, options: &DrawOptions) -> String {
    let mut attributes = options.attributes.clone();
    let mut out = String::new();
    if options.responsive {
        attributes.insert("style".to_string(), "width:100%;".to_string());
    } else {
        out.push_str(&format!(r#"width="{width}" height="{height}""#));
    }
    for (key, value) in &attributes {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!(r#"{key}="{}""#, escape_xml(value)));
    }
    out
}

fn feature_attributes(feature: &Feature, options: &DrawOptions) -> String {
    let mut attributes = BTreeMap::new();
    for name in &options.use_properties {
        if let Some(value) = feature.property_text(name) {
            attributes.insert(name.as_str(), value);
        }
    }
    if options.with_ids {
        if let Some(id) = &feature.id {
            attributes.insert("id", id.clone());
        }
    }
    let mut out = String::new();
    for (key, value) in attributes {
        out.push_str(&format!(r#" {key}="{}""#, escape_xml(&value)));
    }
    out
}

fn write_geometry(
    out: &mut String,
    scale: &ScaleFunction,
    geometry: &Geometry,
    attributes: &str,
    title: Option<&str>,
) {
    match geometry {
        Geometry::Point(p) => {
            let [x, y] = scale.apply(*p);
            out.push_str(&format!(r#"<circle cx="{x:.6}" cy="{y:.6}" r="1"{attributes}"#));
            close_element(out, "circle", title);
        }
        Geometry::LineString(line) => {
            out.push_str(&format!(r#"<path d="{}"{attributes}"#, line_path(scale, line)));
            close_element(out, "path", title);
        }
        Geometry::Polygon(rings) => {
            out.push_str(&format!(r#"<path d="{}"{attributes}"#, polygon_path(scale, rings)));
            close_element(out, "path", title);
        }
        Geometry::MultiPoint(points) => {
            let children: Vec<Geometry> = points.iter().map(|p| Geometry::Point(*p)).collect();
            write_group(out, scale, &children, attributes, title);
        }
        Geometry::MultiLineString(lines) => {
            let children: Vec<Geometry> =
                lines.iter().cloned().map(Geometry::LineString).collect();
            write_group(out, scale, &children, attributes, title);
        }
        Geometry::MultiPolygon(polygons) => {
            let children: Vec<Geometry> =
                polygons.iter().cloned().map(Geometry::Polygon).collect();
            write_group(out, scale, &children, attributes, title);
        }
        Geometry::Collection(children) => write_group(out, scale, children, attributes, title),
    }
}

fn write_group(
    out: &mut String,
    scale: &ScaleFunction,
    children: &[Geometry],
    attributes: &str,
    title: Option<&str>,
) {
    out.push_str(&format!("<g{attributes}>"));
    if let Some(title) = title {
        out.push_str(&format!("<title>{}</title>", escape_xml(title)));
    }
    for child in children {
        out.push('\n');
        write_geometry(out, scale, child, "", None);
    }
    out.push_str("\n</g>");
}

fn close_element(out: &mut String, tag: &str, title: Option<&str>) {
    match title {
        Some(title) => {
            out.push_str(&format!("><title>{}</title></{tag}>", escape_xml(title)));
        }
        None => out.push_str("/>"),
    }
}

fn line_path(scale: &ScaleFunction, line: &[Position]) -> String {
    let points: Vec<String> = line
        .iter()
        .map(|p| {
            let [x, y] = scale.apply(*p);
            format!("{x:.6} {y:.6}")
        })
        .collect();
    format!("M{}", points.join(","))
}

fn polygon_path(scale: &ScaleFunction, rings: &[Vec<Position>]) -> String {
    let subpaths: Vec<String> = rings.iter().map(|r| line_path(scale, r)).collect();
    format!("{} Z", subpaths.join(" "))
}

pub(crate) fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use serde_json::json;

    fn canvas_with(geometry: Geometry) -> SvgCanvas {
        let mut canvas = SvgCanvas::new();
        canvas.append_geometry(geometry);
        canvas
    }

    #[test]
    fn empty_canvas() {
        let svg = SvgCanvas::new().draw(400.0, 400.45, &DrawOptions::default());
        assert_eq!(svg, "<svg width=\"400\" height=\"400.45\">\n</svg>");
    }

    #[test]
    fn single_point_is_centred() {
        let svg = canvas_with(Geometry::Point([10.5, 20.0])).draw(400.0, 400.0, &DrawOptions::default());
        assert_eq!(
            svg,
            "<svg width=\"400\" height=\"400\">\n<circle cx=\"200.000000\" cy=\"200.000000\" r=\"1\"/>\n</svg>"
        );
    }

    #[test]
    fn line_string_fills_the_surface() {
        let svg = canvas_with(Geometry::LineString(vec![[10.4, 20.5], [40.3, 42.3]]))
            .draw(400.0, 400.0, &DrawOptions::default());
        assert!(svg.contains(r#"<path d="M0.000000 291.638796,400.000000 0.000000"/>"#));
    }

    #[test]
    fn polygon_with_hole_has_one_subpath_per_ring() {
        let svg = canvas_with(Geometry::Polygon(vec![
            vec![[100.0, 0.0], [101.0, 0.0], [101.0, 1.0], [100.0, 1.0], [100.0, 0.0]],
            vec![[100.2, 0.2], [100.8, 0.2], [100.8, 0.8], [100.2, 0.8], [100.2, 0.2]],
        ]))
        .draw(400.0, 400.0, &DrawOptions::default());
        assert!(svg.contains(
            "M0.000000 400.000000,400.000000 400.000000,400.000000 0.000000,0.000000 0.000000,0.000000 400.000000 \
             M80.000000 320.000000,320.000000 320.000000,320.000000 80.000000,80.000000 80.000000,80.000000 320.000000 Z"
        ));
    }

    #[test]
    fn multi_point_is_grouped() {
        let svg = canvas_with(Geometry::MultiPoint(vec![[10.5, 20.0], [20.5, 62.0]]))
            .draw(400.0, 400.0, &DrawOptions::default());
        assert_eq!(
            svg,
            "<svg width=\"400\" height=\"400\">\n<g>\n<circle cx=\"0.000000\" cy=\"400.000000\" r=\"1\"/>\n\
             <circle cx=\"95.238095\" cy=\"0.000000\" r=\"1\"/>\n</g>\n</svg>"
        );
    }

    #[test]
    fn padding_insets_the_drawing() {
        let svg = canvas_with(Geometry::LineString(vec![
            [0.0, 0.0],
            [0.0, 400.0],
            [400.0, 400.0],
            [400.0, 0.0],
        ]))
        .draw(200.0, 200.0, &DrawOptions::default().with_padding(Padding::uniform(5.0)));
        assert!(svg.contains(
            r#"d="M5.000000 195.000000,5.000000 5.000000,195.000000 5.000000,195.000000 195.000000""#
        ));
    }

    #[test]
    fn root_attributes_are_sorted_and_last_write_wins() {
        let options = DrawOptions::default()
            .with_attribute("id", "the_id")
            .with_attribute("class", "a_class")
            .with_attribute("class", "a_class_2");
        let svg = SvgCanvas::new().draw(200.0, 200.0, &options);
        assert_eq!(
            svg,
            "<svg width=\"200\" height=\"200\" class=\"a_class_2\" id=\"the_id\">\n</svg>"
        );
    }

    #[test]
    fn only_allowed_properties_become_attributes() {
        let mut feature = Feature::new(Geometry::Point([10.5, 20.0]));
        feature.properties.insert("class".into(), json!("class"));
        feature.properties.insert("style".into(), json!("stroke:1"));
        let mut canvas = SvgCanvas::new();
        canvas.append_feature(feature);

        let default = canvas.draw(400.0, 400.0, &DrawOptions::default());
        assert!(default.contains(r#"r="1" class="class"/>"#));
        assert!(!default.contains("stroke:1"));

        let styled = canvas.draw(400.0, 400.0, &DrawOptions::default().use_properties(["style"]));
        assert!(styled.contains(r#"r="1" style="stroke:1"/>"#));

        let none = canvas.draw(400.0, 400.0, &DrawOptions::default().use_properties(Vec::<String>::new()));
        assert!(none.contains(r#"r="1"/>"#));
    }

    #[test]
    fn titles_ids_and_escaping() {
        let mut feature = Feature::new(Geometry::MultiPoint(vec![[0.0, 0.0], [1.0, 1.0]]));
        feature.id = Some("map-a".into());
        feature.properties.insert("name".into(), json!("Tom & Jerry <3"));
        let mut canvas = SvgCanvas::new();
        canvas.append_feature(feature);
        let svg = canvas.draw(10.0, 10.0, &DrawOptions::default().with_ids().with_titles("name"));
        assert!(svg.contains(r#"<g id="map-a"><title>Tom &amp; Jerry &lt;3</title>"#));
    }

    #[test]
    fn responsive_drops_fixed_size() {
        let options = DrawOptions::default()
            .responsive(true)
            .with_attribute("id", "x-map-svg")
            .with_attribute("viewBox", "0 0 400 748");
        let svg = SvgCanvas::new().draw(400.0, 748.0, &options);
        assert!(svg.starts_with(r#"<svg id="x-map-svg" style="width:100%;" viewBox="0 0 400 748">"#));
    }

    #[test]
    fn patterns_precede_geometry() {
        let svg = canvas_with(Geometry::Point([0.0, 0.0])).draw(
            10.0,
            10.0,
            &DrawOptions::default().with_pattern(r#"<pattern id="p"></pattern>"#),
        );
        assert!(svg.contains("<svg width=\"10\" height=\"10\">\n<defs><pattern id=\"p\"></pattern></defs>\n<circle"));
    }

    #[test]
    fn bounding_box_is_refreshed_after_append() {
        let mut canvas = canvas_with(Geometry::Point([0.0, 0.0]));
        let first = canvas.bounding_box(Projection::Identity).unwrap();
        assert_eq!(first.width(), 0.0);
        canvas.append_geometry(Geometry::Point([4.0, 2.0]));
        let second = canvas.bounding_box(Projection::Identity).unwrap();
        assert_eq!(second.width(), 4.0);
        assert_eq!(canvas.height_for_width(400.0, Projection::Identity), 200.0);
    }

    struct Wrapping;

    impl PngConverter for Wrapping {
        fn convert(&self, _svg: &[u8]) -> Result<Vec<u8>> {
            Ok(b"cG5n".to_vec())
        }
    }

    #[test]
    fn png_fallback_wraps_content_in_switch() {
        let options = DrawOptions::default().with_png_fallback(Some(Arc::new(Wrapping)));
        let svg = canvas_with(Geometry::Point([0.0, 0.0])).draw(10.0, 10.0, &options);
        assert!(svg.starts_with("<svg width=\"10\" height=\"10\">\n\t<switch>"));
        assert!(svg.contains("<foreignObject><img alt=\"Fallback map image for older browsers\" src=\"data:image/png;base64,cG5n\" /></foreignObject>"));
    }
}
