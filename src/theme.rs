use serde::{Deserialize, Serialize};

/// Colours and font size used for legends and the missing-data fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub font_size: f64,
    pub tick_color: String,
    pub reference_color: String,
    pub key_border_color: String,
    pub missing_pattern_background: String,
    pub missing_pattern_stripe: String,
}

impl Theme {
    pub fn classic() -> Self {
        Self {
            font_size: 14.0,
            tick_color: "Black".to_string(),
            reference_color: "DimGrey".to_string(),
            key_border_color: "black".to_string(),
            missing_pattern_background: "#FFFFFF".to_string(),
            missing_pattern_stripe: "#A9A9A9".to_string(),
        }
    }

    pub fn high_contrast() -> Self {
        Self {
            font_size: 16.0,
            tick_color: "#000000".to_string(),
            reference_color: "#000000".to_string(),
            key_border_color: "#000000".to_string(),
            missing_pattern_background: "#FFFFFF".to_string(),
            missing_pattern_stripe: "#000000".to_string(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "classic" | "default" => Some(Self::classic()),
            "high-contrast" | "highContrast" => Some(Self::high_contrast()),
            _ => None,
        }
    }

    /// Diagonal stripes used to fill regions without data.
    pub fn missing_pattern(&self, id: &str) -> String {
        format!(
            r#"<pattern id="{id}" width="4" height="4" patternUnits="userSpaceOnUse" patternTransform="rotate(45)"><rect width="4" height="4" fill="{}"/><line x1="0" y1="0" x2="0" y2="4" style="stroke: {}; stroke-width: 2;"/></pattern>"#,
            self.missing_pattern_background, self.missing_pattern_stripe
        )
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::classic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_carries_id_and_colours() {
        let pattern = Theme::classic().missing_pattern("abc-nodata");
        assert!(pattern.starts_with(r#"<pattern id="abc-nodata""#));
        assert!(pattern.contains("#A9A9A9"));
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Theme::by_name("default"), Some(Theme::classic()));
        assert!(Theme::by_name("neon").is_none());
    }
}
