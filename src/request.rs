//! Render request model.

use serde::{Deserialize, Serialize};

use crate::choropleth::{Choropleth, DataRow, LegendPosition};
use crate::error::{MapError, Result};
use crate::topology::Topology;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderRequest {
    pub title: String,
    pub subtitle: String,
    pub source: String,
    pub source_link: String,
    pub licence: String,
    pub filename: String,
    pub footnotes: Vec<String>,
    pub map_type: String,
    pub geography: Option<Geography>,
    /// Ids match the values of `geography.id_property`.
    pub data: Vec<DataRow>,
    pub choropleth: Option<Choropleth>,
    /// View box width; also the breakpoint basis for responsive legends.
    pub width: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub include_fallback_png: bool,
    pub font_size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geography {
    pub topojson: Option<Topology>,
    pub id_property: String,
    pub name_property: String,
}

impl RenderRequest {
    /// Parses a request body. An empty object is rejected as carrying no data.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let request: RenderRequest = serde_json::from_slice(body)?;
        if body.len() == 2 {
            return Err(MapError::NoData);
        }
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        match &self.geography {
            None => missing.push("geography"),
            Some(geography) => {
                if geography.topojson.is_none() {
                    missing.push("geography.topojson");
                }
                if geography.id_property.is_empty() {
                    missing.push("geography.id_property");
                }
            }
        }
        if self.data.is_empty() {
            missing.push("data");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MapError::MissingFields(
                missing.into_iter().map(str::to_string).collect(),
            ))
        }
    }

    pub fn is_responsive(&self) -> bool {
        self.min_width > 0.0 || self.max_width > 0.0
    }

    /// The choropleth to style with, `None` when absent or without breaks.
    pub fn active_choropleth(&self) -> Option<&Choropleth> {
        self.choropleth.as_ref().filter(|c| !c.breaks.is_empty())
    }

    pub fn has_horizontal_legend(&self) -> bool {
        self.active_choropleth()
            .is_some_and(|c| c.horizontal_legend_position.is_shown())
    }

    pub fn has_vertical_legend(&self) -> bool {
        self.active_choropleth()
            .is_some_and(|c| c.vertical_legend_position.is_shown())
    }

    pub fn horizontal_legend_position(&self) -> LegendPosition {
        self.active_choropleth()
            .map_or(LegendPosition::None, |c| c.horizontal_legend_position)
    }

    pub fn vertical_legend_position(&self) -> LegendPosition {
        self.active_choropleth()
            .map_or(LegendPosition::None, |c| c.vertical_legend_position)
    }
}
