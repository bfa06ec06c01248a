//! Per-layer placemark templates: title, description and time.
//!
//! Placeholders take the form `${fid}`, `${ATTR.value}`, `${ATTR.name}` or the
//! shorthand `${ATTR}`. Unknown attributes expand to nothing.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::warn;

use crate::domain::document::TimePrimitive;
use crate::domain::entities::{AttributeValue, Feature, LayerTemplates};
use crate::domain::types::QualifiedName;

const SPAN_SEPARATOR: &str = "||";

/// Expands a layer's templates against individual features.
#[derive(Debug, Clone, Copy)]
pub struct PlacemarkTemplates<'a> {
    layer: &'a QualifiedName,
    templates: &'a LayerTemplates,
    include_attributes: bool,
}

impl<'a> PlacemarkTemplates<'a> {
    pub fn new(
        layer: &'a QualifiedName,
        templates: &'a LayerTemplates,
        include_attributes: bool,
    ) -> Self {
        Self {
            layer,
            templates,
            include_attributes,
        }
    }

    /// Placemark name; the feature id unless a title template yields text.
    pub fn title(&self, feature: &Feature) -> String {
        self.templates
            .title
            .as_deref()
            .map(|template| expand(template, feature))
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| feature.id.clone())
    }

    /// HTML description, or `None` when attributes are switched off.
    pub fn description(&self, feature: &Feature) -> Option<String> {
        if !self.include_attributes {
            return None;
        }
        match self.templates.description.as_deref() {
            Some(template) => Some(expand(template, feature)),
            None => Some(default_description(self.layer, feature)),
        }
    }

    pub fn extended_data(&self, feature: &Feature) -> Vec<(String, String)> {
        if !self.include_attributes {
            return Vec::new();
        }
        feature
            .attributes
            .iter()
            .map(|attribute| (attribute.name.clone(), attribute.value.to_string()))
            .collect()
    }

    pub fn time(&self, feature: &Feature) -> Option<TimePrimitive> {
        let template = self.templates.time.as_deref()?;
        let rendered = expand(template, feature);
        parse_time(&rendered, &feature.id)
    }
}

/// Substitute every placeholder in `template`.
pub fn expand(template: &str, feature: &Feature) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("${") {
        output.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };
        output.push_str(&placeholder_value(after[..close].trim(), feature));
        rest = &after[close + 1..];
    }
    output.push_str(rest);
    output
}

fn placeholder_value(key: &str, feature: &Feature) -> String {
    if key == "fid" {
        return feature.id.clone();
    }
    let (attribute, part) = match key.rsplit_once('.') {
        Some((attribute, part @ ("value" | "name" | "rawValue"))) => (attribute, part),
        _ => (key, "value"),
    };
    match (feature.attribute(attribute), part) {
        (Some(_), "name") => attribute.to_string(),
        (Some(value), _) => value.to_string(),
        (None, _) => String::new(),
    }
}

fn default_description(layer: &QualifiedName, feature: &Feature) -> String {
    let mut html = format!(
        "<h4>{}</h4>\n<ul class=\"textattributes\">\n",
        escape_html(layer.local())
    );
    for attribute in &feature.attributes {
        if matches!(attribute.value, AttributeValue::Null) {
            continue;
        }
        html.push_str(&format!(
            "  <li><strong><span class=\"atr-name\">{}</span>:</strong> <span class=\"atr-value\">{}</span></li>\n",
            escape_html(&attribute.name),
            escape_html(&attribute.value.to_string()),
        ));
    }
    html.push_str("</ul>\n");
    html
}

/// `a||b` becomes a span (either side may be empty), anything else an instant.
fn parse_time(rendered: &str, feature_id: &str) -> Option<TimePrimitive> {
    let rendered = rendered.trim();
    if rendered.is_empty() {
        return None;
    }
    match rendered.split_once(SPAN_SEPARATOR) {
        Some((begin, end)) => {
            let begin = encode_instant(begin, feature_id);
            let end = encode_instant(end, feature_id);
            (begin.is_some() || end.is_some()).then_some(TimePrimitive::Span { begin, end })
        }
        None => encode_instant(rendered, feature_id).map(TimePrimitive::Stamp),
    }
}

/// Re-encode a date or date-time as ISO-8601; date-times are normalised to UTC.
fn encode_instant(raw: &str, feature_id: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return value.to_offset(UtcOffset::UTC).format(&Rfc3339).ok();
    }
    let local = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(value) = PrimitiveDateTime::parse(raw, local) {
        return value.assume_utc().format(&Rfc3339).ok();
    }
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(value) = PrimitiveDateTime::parse(raw, spaced) {
        return value.assume_utc().format(&Rfc3339).ok();
    }
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(date.to_string());
    }
    warn!(
        target = "application::templates::PlacemarkTemplates",
        feature = feature_id,
        value = raw,
        "time template output is not a date, skipping"
    );
    None
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;
    use time::macros::{date, datetime};

    fn storm() -> Feature {
        Feature::new("storm_obs.1321870537475", point!(x: -90.0, y: 30.0).into())
            .with_attribute(
                "obs_datetime",
                AttributeValue::DateTime(datetime!(1994-07-01 12:30:00 -5)),
            )
            .with_attribute("obs_end", AttributeValue::Date(date!(1994 - 07 - 02)))
            .with_attribute("name", AttributeValue::Text("Storm <A>".into()))
            .with_attribute("note", AttributeValue::Null)
    }

    fn templates(time: Option<&str>) -> LayerTemplates {
        LayerTemplates {
            title: Some("${name.value} (${fid})".into()),
            description: None,
            time: time.map(str::to_string),
        }
    }

    #[test]
    fn expands_value_name_and_fid_placeholders() {
        let feature = storm();
        assert_eq!(
            expand("${name.name}=${name.value};${name};${missing.value}|${fid}", &feature),
            "name=Storm <A>;Storm <A>;|storm_obs.1321870537475"
        );
        assert_eq!(expand("open ${name", &feature), "open ${name");
    }

    #[test]
    fn title_falls_back_to_feature_id() {
        let layer = QualifiedName::new(Some("sf"), "StormObs");
        let feature = storm();
        let custom = templates(None);
        assert_eq!(
            PlacemarkTemplates::new(&layer, &custom, true).title(&feature),
            "Storm <A> (storm_obs.1321870537475)"
        );
        let empty = LayerTemplates::default();
        assert_eq!(
            PlacemarkTemplates::new(&layer, &empty, true).title(&feature),
            "storm_obs.1321870537475"
        );
    }

    #[test]
    fn instant_is_normalised_to_utc() {
        let layer = QualifiedName::new(Some("sf"), "StormObs");
        let layer_templates = templates(Some("${obs_datetime.value}"));
        let time = PlacemarkTemplates::new(&layer, &layer_templates, true).time(&storm());
        assert_eq!(
            time,
            Some(TimePrimitive::Stamp("1994-07-01T17:30:00Z".to_string()))
        );
    }

    #[test]
    fn separator_produces_span() {
        let layer = QualifiedName::new(Some("sf"), "StormObs");
        let layer_templates = templates(Some("${obs_datetime.value}||${obs_end.value}"));
        let time = PlacemarkTemplates::new(&layer, &layer_templates, true).time(&storm());
        assert_eq!(
            time,
            Some(TimePrimitive::Span {
                begin: Some("1994-07-01T17:30:00Z".to_string()),
                end: Some("1994-07-02".to_string()),
            })
        );
        assert_eq!(
            parse_time("||1994-07-03 08:00:00", "f"),
            Some(TimePrimitive::Span {
                begin: None,
                end: Some("1994-07-03T08:00:00Z".to_string()),
            })
        );
        assert_eq!(parse_time("not a date", "f"), None);
    }

    #[test]
    fn default_description_lists_attributes() {
        let layer = QualifiedName::new(Some("sf"), "StormObs");
        let empty = LayerTemplates::default();
        let description = PlacemarkTemplates::new(&layer, &empty, true)
            .description(&storm())
            .expect("attributes enabled");
        insta::assert_snapshot!(description, @r#"
        <h4>StormObs</h4>
        <ul class="textattributes">
          <li><strong><span class="atr-name">obs_datetime</span>:</strong> <span class="atr-value">1994-07-01T12:30:00-05:00</span></li>
          <li><strong><span class="atr-name">obs_end</span>:</strong> <span class="atr-value">1994-07-02</span></li>
          <li><strong><span class="atr-name">name</span>:</strong> <span class="atr-value">Storm &lt;A&gt;</span></li>
        </ul>
        "#);
        assert_eq!(
            PlacemarkTemplates::new(&layer, &empty, false).description(&storm()),
            None
        );
    }
}
