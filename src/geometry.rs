//! Decoded (GeoJSON-shaped) geometry used by the drawing path.

use serde_json::{Map, Value, json};

pub type Position = [f64; 2];

/// Open property bag attached to every feature.
pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
    Collection(Vec<Geometry>),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::Collection(_) => "GeometryCollection",
        }
    }

    /// Calls `visit` for every position of the geometry, depth first.
    pub fn for_each_position(&self, visit: &mut impl FnMut(Position)) {
        match self {
            Geometry::Point(p) => visit(*p),
            Geometry::MultiPoint(points) | Geometry::LineString(points) => {
                points.iter().copied().for_each(visit)
            }
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                for line in lines {
                    line.iter().copied().for_each(&mut *visit);
                }
            }
            Geometry::MultiPolygon(polygons) => {
                for ring in polygons.iter().flatten() {
                    ring.iter().copied().for_each(&mut *visit);
                }
            }
            Geometry::Collection(children) => {
                for child in children {
                    child.for_each_position(visit);
                }
            }
        }
    }

    pub fn positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        self.for_each_position(&mut |p| out.push(p));
        out
    }

    pub fn to_geojson(&self) -> Value {
        let (key, value) = match self {
            Geometry::Point(p) => ("coordinates", json!(p)),
            Geometry::MultiPoint(points) => ("coordinates", json!(points)),
            Geometry::LineString(line) => ("coordinates", json!(line)),
            Geometry::MultiLineString(lines) => ("coordinates", json!(lines)),
            Geometry::Polygon(rings) => ("coordinates", json!(rings)),
            Geometry::MultiPolygon(polygons) => ("coordinates", json!(polygons)),
            Geometry::Collection(children) => (
                "geometries",
                Value::Array(children.iter().map(Geometry::to_geojson).collect()),
            ),
        };
        json!({"type": self.kind(), key: value})
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub geometry: Geometry,
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            geometry,
            properties: Properties::new(),
        }
    }

    /// Returns the property as display text: strings verbatim, other values as JSON,
    /// and `None` when absent or null.
    pub fn property_text(&self, name: &str) -> Option<String> {
        match self.properties.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Sets `name` to `value`, keeping any existing value after it separated by a space.
    pub fn prepend_property(&mut self, name: &str, value: &str) {
        let combined = match self.property_text(name) {
            Some(existing) => format!("{value} {existing}"),
            None => value.to_string(),
        };
        self.properties.insert(name.to_string(), Value::String(combined));
    }

    pub fn to_geojson(&self) -> Value {
        let mut feature = json!({
            "type": "Feature",
            "geometry": self.geometry.to_geojson(),
            "properties": Value::Object(self.properties.clone()),
        });
        if let Some(id) = &self.id {
            feature["id"] = Value::String(id.clone());
        }
        feature
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": self.features.iter().map(Feature::to_geojson).collect::<Vec<_>>(),
        })
    }
}
