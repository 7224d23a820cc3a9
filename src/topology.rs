//! TopoJSON model, decoding into features and encoding from features.
//!
//! Lines and areas reference shared arcs by signed index: `i >= 0` reads
//! `arcs[i]` forward, a negative index reads `arcs[!i]` backwards. When a
//! [`Transform`] is present arc coordinates are delta-encoded integers that
//! must be summed and de-quantized; without one they are absolute positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MapError, Result};
use crate::geometry::{Feature, FeatureCollection, Geometry, Position, Properties};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    #[serde(rename = "type", default = "topology_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub arcs: Vec<Vec<Position>>,
    #[serde(default)]
    pub objects: BTreeMap<String, TopoGeometry>,
}

fn topology_type() -> String {
    "Topology".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    pub scale: [f64; 2],
    pub translate: [f64; 2],
}

impl Transform {
    fn apply(&self, [x, y]: Position) -> Position {
        [
            x * self.scale[0] + self.translate[0],
            y * self.scale[1] + self.translate[1],
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopoGeometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    #[serde(flatten)]
    pub shape: TopoShape,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TopoShape {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { arcs: Vec<i64> },
    MultiLineString { arcs: Vec<Vec<i64>> },
    Polygon { arcs: Vec<Vec<i64>> },
    MultiPolygon { arcs: Vec<Vec<Vec<i64>>> },
    GeometryCollection { geometries: Vec<TopoGeometry> },
}

impl TopoGeometry {
    pub fn new(shape: TopoShape) -> Self {
        Self {
            id: None,
            properties: Properties::new(),
            shape,
        }
    }

    /// The id as text; numeric ids are formatted as JSON numbers.
    pub fn id_text(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl Topology {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty() || self.objects.is_empty()
    }

    /// Converts every object into features. Top-level geometry collections are
    /// split into one feature per child.
    pub fn to_features(&self) -> Result<FeatureCollection> {
        decode(self)
    }
}

/// Decodes a topology into a feature collection.
pub fn decode(topology: &Topology) -> Result<FeatureCollection> {
    let decoder = Decoder::new(topology);
    let mut features = Vec::new();
    for object in topology.objects.values() {
        match &object.shape {
            TopoShape::GeometryCollection { geometries } => {
                for child in geometries {
                    features.push(decoder.feature(child)?);
                }
            }
            _ => features.push(decoder.feature(object)?),
        }
    }
    Ok(FeatureCollection::new(features))
}

struct Decoder {
    transform: Option<Transform>,
    arcs: Vec<Vec<Position>>,
}

impl Decoder {
    fn new(topology: &Topology) -> Self {
        let transform = topology.transform;
        let arcs = topology
            .arcs
            .iter()
            .map(|arc| decode_arc(arc, transform.as_ref()))
            .collect();
        Self { transform, arcs }
    }

    fn feature(&self, object: &TopoGeometry) -> Result<Feature> {
        Ok(Feature {
            id: object.id_text(),
            geometry: self.geometry(&object.shape)?,
            properties: object.properties.clone(),
        })
    }

    fn geometry(&self, shape: &TopoShape) -> Result<Geometry> {
        Ok(match shape {
            TopoShape::Point { coordinates } => Geometry::Point(self.point(*coordinates)),
            TopoShape::MultiPoint { coordinates } => {
                Geometry::MultiPoint(coordinates.iter().map(|p| self.point(*p)).collect())
            }
            TopoShape::LineString { arcs } => Geometry::LineString(self.line(arcs)?),
            TopoShape::MultiLineString { arcs } => Geometry::MultiLineString(
                arcs.iter().map(|l| self.line(l)).collect::<Result<_>>()?,
            ),
            TopoShape::Polygon { arcs } => Geometry::Polygon(self.polygon(arcs)?),
            TopoShape::MultiPolygon { arcs } => Geometry::MultiPolygon(
                arcs.iter().map(|p| self.polygon(p)).collect::<Result<_>>()?,
            ),
            TopoShape::GeometryCollection { geometries } => Geometry::Collection(
                geometries
                    .iter()
                    .map(|g| self.geometry(&g.shape))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    fn point(&self, position: Position) -> Position {
        match &self.transform {
            Some(t) => t.apply(position),
            None => position,
        }
    }

    fn arc(&self, index: i64) -> Result<(&[Position], bool)> {
        let (resolved, reversed) = if index < 0 { (!index, true) } else { (index, false) };
        let arc = usize::try_from(resolved)
            .ok()
            .and_then(|i| self.arcs.get(i))
            .ok_or(MapError::ArcIndexOutOfRange {
                index,
                arc_count: self.arcs.len(),
            })?;
        Ok((arc.as_slice(), reversed))
    }

    fn line(&self, indices: &[i64]) -> Result<Vec<Position>> {
        let mut line = Vec::new();
        for &index in indices {
            let (arc, reversed) = self.arc(index)?;
            if reversed {
                line.extend(arc.iter().rev().copied());
            } else {
                line.extend_from_slice(arc);
            }
        }
        if line.len() == 1 {
            line.push(line[0]);
        }
        Ok(line)
    }

    fn ring(&self, indices: &[i64]) -> Result<Vec<Position>> {
        let mut ring = self.line(indices)?;
        if let Some(&first) = ring.first() {
            while ring.len() < 4 {
                ring.push(first);
            }
        }
        Ok(ring)
    }

    fn polygon(&self, rings: &[Vec<i64>]) -> Result<Vec<Vec<Position>>> {
        rings.iter().map(|r| self.ring(r)).collect()
    }
}

fn decode_arc(arc: &[Position], transform: Option<&Transform>) -> Vec<Position> {
    let Some(transform) = transform else {
        return arc.to_vec();
    };
    let (mut x, mut y) = (0.0, 0.0);
    arc.iter()
        .map(|&[dx, dy]| {
            x += dx;
            y += dy;
            transform.apply([x, y])
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Name of the single object holding the encoded features.
    pub object_name: String,
    /// String property used as the feature id when the feature has none.
    pub id_property: Option<String>,
    /// Grid size for quantization; `None` stores absolute coordinates.
    pub quantization: Option<f64>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            object_name: "features".to_string(),
            id_property: None,
            quantization: None,
        }
    }
}

/// Encodes features into a topology holding one geometry collection. Every
/// line and ring is stored as its own arc.
pub fn encode(collection: &FeatureCollection, options: &EncodeOptions) -> Topology {
    let bbox = bounding_box(collection);
    let quantizer = match (options.quantization, bbox) {
        (Some(q), Some(b)) if q > 1.0 => Some(Quantizer::new(q, b)),
        _ => None,
    };
    let mut encoder = Encoder {
        arcs: Vec::new(),
        quantizer,
    };

    let geometries = collection
        .features
        .iter()
        .enumerate()
        .map(|(index, feature)| {
            let id = feature
                .id
                .clone()
                .or_else(|| {
                    options
                        .id_property
                        .as_deref()
                        .and_then(|p| feature.properties.get(p))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("feature_{index}"));
            TopoGeometry {
                id: Some(Value::String(id)),
                properties: feature.properties.clone(),
                shape: encoder.shape(&feature.geometry),
            }
        })
        .collect();

    let mut objects = BTreeMap::new();
    objects.insert(
        options.object_name.clone(),
        TopoGeometry::new(TopoShape::GeometryCollection { geometries }),
    );

    Topology {
        kind: topology_type(),
        bbox: bbox.map(|b| b.to_vec()),
        transform: quantizer.map(|q| q.transform()),
        arcs: encoder.arcs,
        objects,
    }
}

fn bounding_box(collection: &FeatureCollection) -> Option<[f64; 4]> {
    let mut bbox: Option<[f64; 4]> = None;
    for feature in &collection.features {
        feature.geometry.for_each_position(&mut |[x, y]| {
            bbox = Some(match bbox {
                None => [x, y, x, y],
                Some([x0, y0, x1, y1]) => [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
            });
        });
    }
    bbox
}

#[derive(Debug, Clone, Copy)]
struct Quantizer {
    x0: f64,
    y0: f64,
    kx: f64,
    ky: f64,
}

impl Quantizer {
    fn new(q: f64, [x0, y0, x1, y1]: [f64; 4]) -> Self {
        let kx = if x1 - x0 != 0.0 { (q - 1.0) / (x1 - x0) } else { 1.0 };
        let ky = if y1 - y0 != 0.0 { (q - 1.0) / (y1 - y0) } else { 1.0 };
        Self { x0, y0, kx, ky }
    }

    fn transform(&self) -> Transform {
        Transform {
            scale: [1.0 / self.kx, 1.0 / self.ky],
            translate: [self.x0, self.y0],
        }
    }

    fn point(&self, [x, y]: Position) -> Position {
        [
            round_half_away((x - self.x0) * self.kx),
            round_half_away((y - self.y0) * self.ky),
        ]
    }

    /// Quantizes and delta-encodes an arc, dropping repeated points but keeping two.
    fn arc(&self, line: &[Position]) -> Vec<Position> {
        let mut absolute: Vec<Position> = Vec::with_capacity(line.len());
        for &p in line {
            let q = self.point(p);
            if absolute.last() != Some(&q) {
                absolute.push(q);
            }
        }
        if absolute.len() == 1 {
            absolute.push(absolute[0]);
        }
        let mut previous = [0.0, 0.0];
        absolute
            .into_iter()
            .map(|[x, y]| {
                let delta = [x - previous[0], y - previous[1]];
                previous = [x, y];
                delta
            })
            .collect()
    }
}

fn round_half_away(v: f64) -> f64 {
    if v < 0.0 { (v - 0.5).ceil() } else { (v + 0.5).floor() }
}

struct Encoder {
    arcs: Vec<Vec<Position>>,
    quantizer: Option<Quantizer>,
}

impl Encoder {
    fn push_arc(&mut self, line: &[Position]) -> i64 {
        let arc = match &self.quantizer {
            Some(q) => q.arc(line),
            None => line.to_vec(),
        };
        self.arcs.push(arc);
        self.arcs.len() as i64 - 1
    }

    fn point(&self, p: Position) -> Position {
        match &self.quantizer {
            Some(q) => q.point(p),
            None => p,
        }
    }

    fn rings(&mut self, rings: &[Vec<Position>]) -> Vec<Vec<i64>> {
        rings.iter().map(|r| vec![self.push_arc(r)]).collect()
    }

    fn shape(&mut self, geometry: &Geometry) -> TopoShape {
        match geometry {
            Geometry::Point(p) => TopoShape::Point {
                coordinates: self.point(*p),
            },
            Geometry::MultiPoint(points) => TopoShape::MultiPoint {
                coordinates: points.iter().map(|p| self.point(*p)).collect(),
            },
            Geometry::LineString(line) => TopoShape::LineString {
                arcs: vec![self.push_arc(line)],
            },
            Geometry::MultiLineString(lines) => TopoShape::MultiLineString {
                arcs: self.rings(lines),
            },
            Geometry::Polygon(rings) => TopoShape::Polygon {
                arcs: self.rings(rings),
            },
            Geometry::MultiPolygon(polygons) => TopoShape::MultiPolygon {
                arcs: polygons.iter().map(|p| self.rings(p)).collect(),
            },
            Geometry::Collection(children) => TopoShape::GeometryCollection {
                geometries: children
                    .iter()
                    .map(|c| TopoGeometry::new(self.shape(c)))
                    .collect(),
            },
        }
    }
}
