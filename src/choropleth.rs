//! Choropleth styling: break lookup, feature colouring and legend segments.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::Feature;

/// Appended to the title of regions that have no data.
pub const MISSING_DATA_TEXT: &str = "data unavailable";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoroplethBreak {
    #[serde(default)]
    pub lower_bound: f64,
    #[serde(rename = "color", alias = "colour", default)]
    pub colour: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendPosition {
    Before,
    After,
    #[default]
    #[serde(other)]
    None,
}

impl LegendPosition {
    pub fn is_shown(self) -> bool {
        self != LegendPosition::None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Choropleth {
    pub reference_value: f64,
    pub reference_value_text: String,
    pub value_prefix: String,
    pub value_suffix: String,
    pub breaks: Vec<ChoroplethBreak>,
    /// Only shown as the last legend tick.
    pub upper_bound: f64,
    /// Solid fill for regions without data; a striped pattern is used when absent.
    #[serde(rename = "missing_value_color", alias = "missing_value_colour")]
    pub missing_value_colour: Option<String>,
    pub horizontal_legend_position: LegendPosition,
    pub vertical_legend_position: LegendPosition,
}

impl Choropleth {
    pub fn has_reference(&self) -> bool {
        !self.reference_value_text.is_empty()
    }

    pub fn legend_title(&self) -> String {
        format!("{} {}", self.value_prefix, self.value_suffix)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub value: f64,
}

/// Formats a value the way legends and titles print numbers: the shortest
/// decimal that round-trips, switching to `1.5e+06` style once the decimal
/// exponent falls below -4 or reaches 6.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return format!("{value}");
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if value != 0.0 && !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        format!("{value}")
    }
}

/// Copy of `breaks` ordered by lower bound.
pub fn sort_breaks(breaks: &[ChoroplethBreak], ascending: bool) -> Vec<ChoroplethBreak> {
    let mut sorted = breaks.to_vec();
    if ascending {
        sorted.sort_by(|a, b| a.lower_bound.total_cmp(&b.lower_bound));
    } else {
        sorted.sort_by(|a, b| b.lower_bound.total_cmp(&a.lower_bound));
    }
    sorted
}

/// Colour of the first break whose lower bound does not exceed `value`; values
/// below every break take the lowest break. `breaks` must be sorted descending.
pub fn colour_for_value(value: f64, breaks: &[ChoroplethBreak]) -> Option<&str> {
    breaks
        .iter()
        .find(|b| value >= b.lower_bound)
        .or_else(|| breaks.last())
        .map(|b| b.colour.as_str())
}

/// Colours each feature by its data row and rewrites the `name_property` into a
/// title carrying the value. Returns the number of features without data.
pub fn assign_colours_and_titles(
    features: &mut [Feature],
    choropleth: &Choropleth,
    data: &[DataRow],
    id_prefix: &str,
    name_property: &str,
    missing_style: &str,
) -> usize {
    let breaks = sort_breaks(&choropleth.breaks, false);
    let values: HashMap<String, (f64, &str)> = data
        .iter()
        .filter_map(|row| {
            let colour = colour_for_value(row.value, &breaks)?;
            Some((format!("{id_prefix}{}", row.id), (row.value, colour)))
        })
        .collect();

    let mut missing = 0;
    for feature in features.iter_mut() {
        let name = feature.property_text(name_property).unwrap_or_default();
        let matched = feature.id.as_ref().and_then(|id| values.get(id));
        let (style, title) = match matched {
            Some(&(value, colour)) => (
                format!("fill: {colour};"),
                format!(
                    "{name} {}{}{}",
                    choropleth.value_prefix,
                    format_value(value),
                    choropleth.value_suffix
                ),
            ),
            None => {
                missing += 1;
                (missing_style.to_string(), format!("{name} {MISSING_DATA_TEXT}"))
            }
        };
        feature
            .properties
            .insert(name_property.to_string(), title.into());
        feature.prepend_property("style", &style);
    }
    if missing > 0 {
        tracing::debug!(missing, total = features.len(), "features without data");
    }
    missing
}

/// One legend segment.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakInfo {
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Fraction of the legend length taken by this segment.
    pub relative_size: f64,
    pub colour: String,
}

/// Legend segments in ascending order plus the relative position of the
/// reference value. The first segment starts at the smallest data value when
/// that is below every break; the scale ends at the larger of the largest data
/// value and the configured upper bound.
pub fn sorted_break_info(choropleth: &Choropleth, data: &[DataRow]) -> (Vec<BreakInfo>, f64) {
    let breaks = sort_breaks(&choropleth.breaks, true);
    let (Some(first), Some(last)) = (breaks.first(), breaks.last()) else {
        return (Vec::new(), 0.0);
    };

    let data_min = data.iter().map(|r| r.value).fold(f64::INFINITY, f64::min);
    let data_max = data.iter().map(|r| r.value).fold(f64::NEG_INFINITY, f64::max);
    let min_value = data_min.min(first.lower_bound);
    let max_value = data_max.max(choropleth.upper_bound).max(last.lower_bound);
    let display_max = if choropleth.upper_bound > last.lower_bound {
        choropleth.upper_bound
    } else {
        max_value
    };
    let total_range = max_value - min_value;

    let count = breaks.len();
    let mut info: Vec<BreakInfo> = breaks
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let lower = if i == 0 { min_value } else { b.lower_bound };
            let upper = breaks.get(i + 1).map_or(max_value, |next| next.lower_bound);
            let relative_size = if total_range > 0.0 {
                (upper - lower) / total_range
            } else {
                1.0 / count as f64
            };
            BreakInfo {
                lower_bound: lower,
                upper_bound: upper,
                relative_size,
                colour: b.colour.clone(),
            }
        })
        .collect();
    if let Some(last) = info.last_mut() {
        last.upper_bound = display_max;
    }

    let reference_position = if total_range > 0.0 {
        (choropleth.reference_value - min_value) / total_range
    } else {
        0.0
    };
    (info, reference_position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use serde_json::json;

    fn brk(lower_bound: f64, colour: &str) -> ChoroplethBreak {
        ChoroplethBreak {
            lower_bound,
            colour: colour.to_string(),
        }
    }

    fn row(id: &str, value: f64) -> DataRow {
        DataRow {
            id: id.to_string(),
            value,
        }
    }

    #[test]
    fn values_print_like_shortest_g() {
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(-123456.123456), "-123456.123456");
        assert_eq!(format_value(0.0001), "0.0001");
        assert_eq!(format_value(0.00001), "1e-05");
        assert_eq!(format_value(-2.5e-7), "-2.5e-07");
        assert_eq!(format_value(1e6), "1e+06");
        assert_eq!(format_value(1234567.0), "1.234567e+06");
        assert_eq!(format_value(1e21), "1e+21");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
    }

    #[test]
    fn colour_lookup_uses_descending_first_match() {
        let breaks = sort_breaks(&[brk(0.0, "red"), brk(11.0, "green"), brk(5.0, "blue")], false);
        assert_eq!(colour_for_value(10.0, &breaks), Some("blue"));
        assert_eq!(colour_for_value(11.0, &breaks), Some("green"));
        assert_eq!(colour_for_value(100.0, &breaks), Some("green"));
        assert_eq!(colour_for_value(-3.0, &breaks), Some("red"));
        assert_eq!(colour_for_value(1.0, &[]), None);
    }

    #[test]
    fn colours_and_titles() {
        let mut features: Vec<Feature> = ["a", "b"]
            .iter()
            .map(|code| {
                let mut f = Feature::new(Geometry::Point([0.0, 0.0]));
                f.id = Some(format!("m-{code}"));
                f.properties.insert("name".into(), json!(format!("feature {code}")));
                f
            })
            .collect();
        let choropleth = Choropleth {
            breaks: vec![brk(0.0, "red"), brk(11.0, "green")],
            value_prefix: "prefix-".into(),
            value_suffix: "-suffix".into(),
            ..Choropleth::default()
        };
        let missing = assign_colours_and_titles(
            &mut features,
            &choropleth,
            &[row("b", 20.0)],
            "m-",
            "name",
            "fill: url(#m-nodata);",
        );
        assert_eq!(missing, 1);
        assert_eq!(
            features[0].property_text("name").as_deref(),
            Some("feature a data unavailable")
        );
        assert_eq!(features[0].property_text("style").as_deref(), Some("fill: url(#m-nodata);"));
        assert_eq!(
            features[1].property_text("name").as_deref(),
            Some("feature b prefix-20-suffix")
        );
        assert_eq!(features[1].property_text("style").as_deref(), Some("fill: green;"));
    }

    #[test]
    fn missing_name_gives_empty_prefix() {
        let mut features = vec![Feature::new(Geometry::Point([0.0, 0.0]))];
        features[0].id = Some("x".into());
        let choropleth = Choropleth {
            breaks: vec![brk(0.0, "red")],
            value_suffix: "% non-UK born".into(),
            ..Choropleth::default()
        };
        assign_colours_and_titles(&mut features, &choropleth, &[row("x", 7.0)], "", "missing", "");
        assert_eq!(
            features[0].property_text("missing").as_deref(),
            Some(" 7% non-UK born")
        );
    }

    #[test]
    fn break_info_spans_data_and_upper_bound() {
        let choropleth = Choropleth {
            breaks: vec![brk(10.0, "b"), brk(0.0, "a"), brk(20.0, "c")],
            upper_bound: 40.0,
            reference_value: 15.0,
            ..Choropleth::default()
        };
        let (info, reference) = sorted_break_info(&choropleth, &[row("x", -10.0), row("y", 30.0)]);
        assert_eq!(info.len(), 3);
        assert_eq!(info[0].lower_bound, -10.0);
        assert_eq!(info[0].colour, "a");
        assert_eq!(info[2].upper_bound, 40.0);
        let total: f64 = info.iter().map(|b| b.relative_size).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(info[0].relative_size, 0.4);
        assert_eq!(reference, 0.5);
    }

    #[test]
    fn upper_bound_below_data_is_still_displayed() {
        let choropleth = Choropleth {
            breaks: vec![brk(0.0, "a"), brk(10.0, "b")],
            upper_bound: 53.0,
            ..Choropleth::default()
        };
        let (info, _) = sorted_break_info(&choropleth, &[row("x", 54.0)]);
        assert_eq!(info[1].upper_bound, 53.0);
    }

    #[test]
    fn zero_range_splits_evenly() {
        let choropleth = Choropleth {
            breaks: vec![brk(5.0, "a")],
            ..Choropleth::default()
        };
        let (info, reference) = sorted_break_info(&choropleth, &[row("x", 5.0)]);
        assert_eq!(info[0].relative_size, 1.0);
        assert_eq!(reference, 0.0);
    }

    #[test]
    fn legend_position_parsing() {
        let c: Choropleth = serde_json::from_value(json!({
            "horizontal_legend_position": "before",
            "vertical_legend_position": "sideways",
            "missing_value_color": "grey"
        }))
        .unwrap();
        assert_eq!(c.horizontal_legend_position, LegendPosition::Before);
        assert_eq!(c.vertical_legend_position, LegendPosition::None);
        assert_eq!(c.missing_value_colour.as_deref(), Some("grey"));
    }
}
