//! KML 2.2 serialization of a [`Document`].
//!
//! Output is indented with two spaces per level. Text is escaped; placemark
//! descriptions are written as CDATA. Characters XML 1.0 cannot carry and
//! non-finite coordinates fail the whole document rather than producing
//! output a client cannot parse.

use geo_types::{Coord, Geometry, LineString, Polygon};
use thiserror::Error;

use crate::domain::document::{
    Document, Folder, FolderChild, GroundOverlay, NetworkLink, Placemark, TimePrimitive,
};
use crate::domain::entities::Style;

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("character U+{code:04X} in <{element}> is not allowed in XML")]
    InvalidCharacter { element: String, code: u32 },
    #[error("feature `{feature}` has a non-finite coordinate")]
    NonFiniteCoordinate { feature: String },
}

/// Serialize `document` to a complete KML file.
pub fn encode_document(document: &Document) -> Result<String, EncodingError> {
    let mut writer = XmlWriter::new();
    writer.raw_line("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    writer.raw_line(&format!(
        "<kml xmlns=\"{KML_NAMESPACE}\" xmlns:atom=\"{ATOM_NAMESPACE}\">"
    ));
    writer.depth += 1;
    writer.open("Document", &[])?;
    if let Some(title) = document.title() {
        writer.text_element("name", title)?;
    }
    for folder in document.folders() {
        write_folder(&mut writer, folder)?;
    }
    writer.close("Document");
    writer.depth -= 1;
    writer.raw_line("</kml>");
    Ok(writer.finish())
}

fn write_folder(writer: &mut XmlWriter, folder: &Folder) -> Result<(), EncodingError> {
    writer.open("Folder", &[])?;
    writer.text_element("name", folder.name())?;
    for link in folder.links() {
        writer.empty(
            "atom:link",
            &[("rel", link.rel.id()), ("href", link.href.as_str())],
        )?;
    }
    if let Some(style) = folder.style() {
        write_style(writer, style)?;
    }
    for child in folder.children() {
        match child {
            FolderChild::Placemark(placemark) => write_placemark(writer, placemark)?,
            FolderChild::GroundOverlay(overlay) => write_overlay(writer, overlay)?,
            FolderChild::NetworkLink(link) => write_network_link(writer, link)?,
        }
    }
    writer.close("Folder");
    Ok(())
}

fn write_style(writer: &mut XmlWriter, style: &Style) -> Result<(), EncodingError> {
    writer.open("Style", &[("id", style.name.as_str())])?;
    if let Some(href) = &style.icon_href {
        writer.open("IconStyle", &[])?;
        writer.open("Icon", &[])?;
        writer.text_element("href", href)?;
        writer.close("Icon");
        writer.close("IconStyle");
    }
    if style.line_color.is_some() || style.line_width.is_some() {
        writer.open("LineStyle", &[])?;
        if let Some(color) = &style.line_color {
            writer.text_element("color", color)?;
        }
        if let Some(width) = style.line_width {
            writer.text_element("width", &width.to_string())?;
        }
        writer.close("LineStyle");
    }
    if let Some(color) = &style.fill_color {
        writer.open("PolyStyle", &[])?;
        writer.text_element("color", color)?;
        writer.close("PolyStyle");
    }
    writer.close("Style");
    Ok(())
}

fn write_placemark(writer: &mut XmlWriter, placemark: &Placemark) -> Result<(), EncodingError> {
    writer.open("Placemark", &[("id", placemark.id.as_str())])?;
    writer.text_element("name", &placemark.name)?;
    if let Some(description) = &placemark.description {
        writer.cdata_element("description", description)?;
    }
    match &placemark.time {
        Some(TimePrimitive::Stamp(when)) => {
            writer.open("TimeStamp", &[])?;
            writer.text_element("when", when)?;
            writer.close("TimeStamp");
        }
        Some(TimePrimitive::Span { begin, end }) => {
            writer.open("TimeSpan", &[])?;
            if let Some(begin) = begin {
                writer.text_element("begin", begin)?;
            }
            if let Some(end) = end {
                writer.text_element("end", end)?;
            }
            writer.close("TimeSpan");
        }
        None => {}
    }
    if let Some(style_url) = &placemark.style_url {
        writer.text_element("styleUrl", style_url)?;
    }
    if !placemark.extended_data.is_empty() {
        writer.open("ExtendedData", &[])?;
        for (name, value) in &placemark.extended_data {
            writer.open("Data", &[("name", name.as_str())])?;
            writer.text_element("value", value)?;
            writer.close("Data");
        }
        writer.close("ExtendedData");
    }
    write_geometry(writer, &placemark.geometry, &placemark.id)?;
    writer.close("Placemark");
    Ok(())
}

fn write_geometry(
    writer: &mut XmlWriter,
    geometry: &Geometry<f64>,
    feature: &str,
) -> Result<(), EncodingError> {
    match geometry {
        Geometry::Point(point) => {
            writer.open("Point", &[])?;
            writer.text_element("coordinates", &coordinates(&[point.0], feature)?)?;
            writer.close("Point");
        }
        Geometry::Line(line) => {
            write_line_string(writer, &LineString::from(vec![line.start, line.end]), feature)?;
        }
        Geometry::LineString(line) => write_line_string(writer, line, feature)?,
        Geometry::Polygon(polygon) => write_polygon(writer, polygon, feature)?,
        Geometry::Rect(rect) => write_polygon(writer, &rect.to_polygon(), feature)?,
        Geometry::Triangle(triangle) => write_polygon(writer, &triangle.to_polygon(), feature)?,
        Geometry::MultiPoint(points) => {
            writer.open("MultiGeometry", &[])?;
            for point in points {
                writer.open("Point", &[])?;
                writer.text_element("coordinates", &coordinates(&[point.0], feature)?)?;
                writer.close("Point");
            }
            writer.close("MultiGeometry");
        }
        Geometry::MultiLineString(lines) => {
            writer.open("MultiGeometry", &[])?;
            for line in lines {
                write_line_string(writer, line, feature)?;
            }
            writer.close("MultiGeometry");
        }
        Geometry::MultiPolygon(polygons) => {
            writer.open("MultiGeometry", &[])?;
            for polygon in polygons {
                write_polygon(writer, polygon, feature)?;
            }
            writer.close("MultiGeometry");
        }
        Geometry::GeometryCollection(collection) => {
            writer.open("MultiGeometry", &[])?;
            for member in collection {
                write_geometry(writer, member, feature)?;
            }
            writer.close("MultiGeometry");
        }
    }
    Ok(())
}

fn write_line_string(
    writer: &mut XmlWriter,
    line: &LineString<f64>,
    feature: &str,
) -> Result<(), EncodingError> {
    writer.open("LineString", &[])?;
    writer.text_element("coordinates", &coordinates(&line.0, feature)?)?;
    writer.close("LineString");
    Ok(())
}

fn write_polygon(
    writer: &mut XmlWriter,
    polygon: &Polygon<f64>,
    feature: &str,
) -> Result<(), EncodingError> {
    writer.open("Polygon", &[])?;
    write_ring(writer, "outerBoundaryIs", polygon.exterior(), feature)?;
    for interior in polygon.interiors() {
        write_ring(writer, "innerBoundaryIs", interior, feature)?;
    }
    writer.close("Polygon");
    Ok(())
}

fn write_ring(
    writer: &mut XmlWriter,
    boundary: &str,
    ring: &LineString<f64>,
    feature: &str,
) -> Result<(), EncodingError> {
    writer.open(boundary, &[])?;
    writer.open("LinearRing", &[])?;
    writer.text_element("coordinates", &coordinates(&ring.0, feature)?)?;
    writer.close("LinearRing");
    writer.close(boundary);
    Ok(())
}

fn coordinates(coords: &[Coord<f64>], feature: &str) -> Result<String, EncodingError> {
    let mut parts = Vec::with_capacity(coords.len());
    for coord in coords {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Err(EncodingError::NonFiniteCoordinate {
                feature: feature.to_string(),
            });
        }
        parts.push(format!("{},{}", coord.x, coord.y));
    }
    Ok(parts.join(" "))
}

fn write_overlay(writer: &mut XmlWriter, overlay: &GroundOverlay) -> Result<(), EncodingError> {
    writer.open("GroundOverlay", &[])?;
    writer.text_element("name", &overlay.name)?;
    writer.text_element("drawOrder", &overlay.draw_order.to_string())?;
    writer.open("Icon", &[])?;
    writer.text_element("href", &overlay.href)?;
    writer.text_element("viewRefreshMode", "never")?;
    writer.close("Icon");
    writer.open("LatLonBox", &[])?;
    writer.text_element("north", &overlay.bbox.max_y.to_string())?;
    writer.text_element("south", &overlay.bbox.min_y.to_string())?;
    writer.text_element("east", &overlay.bbox.max_x.to_string())?;
    writer.text_element("west", &overlay.bbox.min_x.to_string())?;
    writer.close("LatLonBox");
    writer.close("GroundOverlay");
    Ok(())
}

fn write_network_link(writer: &mut XmlWriter, link: &NetworkLink) -> Result<(), EncodingError> {
    writer.open("NetworkLink", &[("id", link.rel.id())])?;
    writer.text_element("description", link.rel.description())?;
    writer.open("Link", &[])?;
    writer.text_element("href", &link.href)?;
    writer.close("Link");
    writer.close("NetworkLink");
    Ok(())
}

/// Minimal indenting XML writer.
struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn raw_line(&mut self, line: &str) {
        self.indent();
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn start_tag(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), EncodingError> {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attributes {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape(name, value)?);
            self.out.push('"');
        }
        Ok(())
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), EncodingError> {
        self.start_tag(name, attributes)?;
        self.out.push_str(">\n");
        self.depth += 1;
        Ok(())
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), EncodingError> {
        self.start_tag(name, attributes)?;
        self.out.push_str("/>\n");
        Ok(())
    }

    fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), EncodingError> {
        let escaped = escape(name, text)?;
        self.indent();
        self.out.push_str(&format!("<{name}>{escaped}</{name}>\n"));
        Ok(())
    }

    fn cdata_element(&mut self, name: &str, text: &str) -> Result<(), EncodingError> {
        check_characters(name, text)?;
        let body = text.replace("]]>", "]]]]><![CDATA[>");
        self.indent();
        self.out
            .push_str(&format!("<{name}><![CDATA[{body}]]></{name}>\n"));
        Ok(())
    }
}

fn is_xml_char(ch: char) -> bool {
    matches!(ch, '\t' | '\n' | '\r') || (ch >= ' ' && ch != '\u{FFFE}' && ch != '\u{FFFF}')
}

fn check_characters(element: &str, text: &str) -> Result<(), EncodingError> {
    match text.chars().find(|ch| !is_xml_char(*ch)) {
        Some(ch) => Err(EncodingError::InvalidCharacter {
            element: element.to_string(),
            code: u32::from(ch),
        }),
        None => Ok(()),
    }
}

fn escape(element: &str, input: &str) -> Result<String, EncodingError> {
    check_characters(element, input)?;
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    Ok(escaped)
}
