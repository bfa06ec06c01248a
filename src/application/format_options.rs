//! Typed view over the free-form `format_options` request parameter.

use std::collections::BTreeMap;

use tracing::warn;

const OPTION_TITLE: &str = "kmltitle";
const OPTION_RELLINKS: &str = "rellinks";
const OPTION_SCORE: &str = "kmscore";
const OPTION_ATTRIBUTES: &str = "kmattr";

/// Vector/raster preference between 0 (always overlay) and 100 (always vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KmScore(u8);

impl KmScore {
    pub const FLOOR: KmScore = KmScore(0);
    pub const CEILING: KmScore = KmScore(100);
    pub const DEFAULT: KmScore = KmScore(40);

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::CEILING.0).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn forces_overlay(self) -> bool {
        self <= Self::FLOOR
    }

    /// Whether a layer with `feature_count` matching features should be sent
    /// as placemarks. Between the extremes the threshold is
    /// `10^(score / 15)` features, using integer division.
    pub fn prefers_vector(self, feature_count: u64) -> bool {
        if self >= Self::CEILING {
            return true;
        }
        if self.forces_overlay() {
            return false;
        }
        let threshold = 10u64.pow(u32::from(self.0 / 15));
        feature_count <= threshold
    }
}

impl Default for KmScore {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Server side defaults applied when a request leaves an option out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDefaults {
    pub score: KmScore,
    pub include_attributes: bool,
}

impl Default for FormatDefaults {
    fn default() -> Self {
        Self {
            score: KmScore::DEFAULT,
            include_attributes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub title: Option<String>,
    pub relative_links: bool,
    pub score: KmScore,
    pub include_attributes: bool,
}

impl FormatOptions {
    /// Malformed values are logged and replaced by the default.
    pub fn from_raw(raw: &BTreeMap<String, String>, defaults: FormatDefaults) -> Self {
        let title = raw
            .get(OPTION_TITLE)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let relative_links = raw
            .get(OPTION_RELLINKS)
            .map(|value| parse_flag(OPTION_RELLINKS, value, false))
            .unwrap_or(false);
        let include_attributes = raw
            .get(OPTION_ATTRIBUTES)
            .map(|value| parse_flag(OPTION_ATTRIBUTES, value, defaults.include_attributes))
            .unwrap_or(defaults.include_attributes);
        let score = raw
            .get(OPTION_SCORE)
            .map(|value| parse_score(value, defaults.score))
            .unwrap_or(defaults.score);

        Self {
            title,
            relative_links,
            score,
            include_attributes,
        }
    }
}

fn parse_flag(option: &'static str, value: &str, fallback: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            warn!(
                target = "application::format_options::FormatOptions",
                option,
                value,
                fallback,
                "unrecognised flag value, using default"
            );
            fallback
        }
    }
}

fn parse_score(value: &str, fallback: KmScore) -> KmScore {
    match value.trim().parse::<u8>().ok().and_then(KmScore::new) {
        Some(score) => score,
        None => {
            warn!(
                target = "application::format_options::FormatOptions",
                option = OPTION_SCORE,
                value,
                fallback = fallback.get(),
                "score must be an integer between 0 and 100, using default"
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::parse_format_options;

    #[test]
    fn defaults_apply_when_options_are_absent() {
        let options = FormatOptions::from_raw(&BTreeMap::new(), FormatDefaults::default());
        assert_eq!(options.title, None);
        assert!(!options.relative_links);
        assert_eq!(options.score, KmScore::DEFAULT);
        assert!(options.include_attributes);
    }

    #[test]
    fn request_options_override_defaults() {
        let raw = parse_format_options("kmltitle:myCustomLayerTitle;rellinks:true;kmscore:0;kmattr:false");
        let options = FormatOptions::from_raw(&raw, FormatDefaults::default());
        assert_eq!(options.title.as_deref(), Some("myCustomLayerTitle"));
        assert!(options.relative_links);
        assert!(options.score.forces_overlay());
        assert!(!options.include_attributes);
    }

    #[test]
    fn malformed_values_fall_back() {
        let raw = parse_format_options("kmscore:250;rellinks:maybe");
        let defaults = FormatDefaults {
            score: KmScore::new(70).expect("in range"),
            include_attributes: false,
        };
        let options = FormatOptions::from_raw(&raw, defaults);
        assert_eq!(options.score.get(), 70);
        assert!(!options.relative_links);
    }

    #[test]
    fn score_threshold_between_extremes() {
        assert!(KmScore::CEILING.prefers_vector(u64::MAX));
        assert!(!KmScore::FLOOR.prefers_vector(0));
        // 40 / 15 = 2, so up to 100 features stay vector.
        assert!(KmScore::DEFAULT.prefers_vector(100));
        assert!(!KmScore::DEFAULT.prefers_vector(101));
        let low = KmScore::new(10).expect("in range");
        assert!(low.prefers_vector(1));
        assert!(!low.prefers_vector(2));
    }
}
