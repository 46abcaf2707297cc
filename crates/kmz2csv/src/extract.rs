//! Placemark extraction: KML element tree to flat geometry records.
//!
//! Each placemark is dispatched over the geometry kinds in a fixed order
//! (point, line, polygon, then the same three again scoped to the first
//! `MultiGeometry`). Geometry searches cover the whole placemark subtree, so a
//! geometry nested in a `MultiGeometry` is emitted by both passes.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::coords::{parse_coordinates, CoordinateTriple};
use crate::error::{ConvertError, Result};
use crate::xml::{Document, Element};

const PLACEMARK: &str = "Placemark";
const MULTI_GEOMETRY: &str = "MultiGeometry";
const POINT_PATH: &[&str] = &["Point", "coordinates"];
const LINE_PATH: &[&str] = &["LineString", "coordinates"];
const POLYGON_PATH: &[&str] = &["Polygon", "outerBoundaryIs", "LinearRing", "coordinates"];

/// Kind of geometry a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GeometryKind {
    /// A single point.
    Point,
    /// One vertex of a line string.
    Line,
    /// One vertex of a polygon outer boundary.
    Polygon,
}

impl GeometryKind {
    /// Name written to the CSV `Type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Line => "Line",
            Self::Polygon => "Polygon",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometryRecord {
    /// Geometry kind.
    pub kind: GeometryKind,
    /// Placemark name, possibly empty.
    pub name: String,
    /// Placemark description, possibly empty.
    pub description: String,
    /// Latitude (degrees).
    pub latitude: f64,
    /// Longitude (degrees).
    pub longitude: f64,
    /// Altitude (meters).
    pub altitude: f64,
    /// Shared by every vertex of one geometry instance.
    pub group_id: u64,
    /// Position within a line or polygon; `None` for points.
    pub vertex_index: Option<usize>,
}

/// Running group id for one document traversal.
///
/// An id is only handed out when a geometry instance commits at least one
/// record, so empty geometries leave no gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupCounter {
    next: u64,
}

impl GroupCounter {
    /// Start at group 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next committed geometry will receive.
    pub fn peek(&self) -> u64 {
        self.next
    }

    fn commit(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Geometries emitted as one record per vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Line,
    Polygon,
}

impl Shape {
    fn kind(self) -> GeometryKind {
        match self {
            Self::Line => GeometryKind::Line,
            Self::Polygon => GeometryKind::Polygon,
        }
    }

    fn path(self) -> &'static [&'static str] {
        match self {
            Self::Line => LINE_PATH,
            Self::Polygon => POLYGON_PATH,
        }
    }
}

/// Name and description shared by every record of a placemark.
struct Labels {
    name: String,
    description: String,
}

impl Labels {
    fn of(placemark: &Element) -> Self {
        let text = |tag: &str| {
            placemark
                .find(tag)
                .map(|e| e.text_content().trim().to_owned())
                .unwrap_or_default()
        };
        Self {
            name: text("name"),
            description: text("description"),
        }
    }

    fn record(
        &self,
        kind: GeometryKind,
        coord: &CoordinateTriple,
        group_id: u64,
        vertex_index: Option<usize>,
    ) -> GeometryRecord {
        GeometryRecord {
            kind,
            name: self.name.clone(),
            description: self.description.clone(),
            latitude: coord.latitude,
            longitude: coord.longitude,
            altitude: coord.altitude,
            group_id,
            vertex_index,
        }
    }
}

/// Extract every geometry record from a parsed KML document.
///
/// Returns [`ConvertError::NoGeometryFound`] when the traversal produces no
/// records at all.
pub fn extract_placemarks(doc: &Document) -> Result<Vec<GeometryRecord>> {
    let placemarks = doc.elements_by_name(PLACEMARK);
    debug!(placemarks = placemarks.len(), "walking placemarks");

    let mut groups = GroupCounter::new();
    let mut records = Vec::new();
    for placemark in placemarks {
        records.extend(extract_placemark(placemark, &mut groups));
    }

    if records.is_empty() {
        return Err(ConvertError::NoGeometryFound);
    }
    Ok(records)
}

/// Extract the records of a single placemark, advancing `groups`.
pub fn extract_placemark(placemark: &Element, groups: &mut GroupCounter) -> Vec<GeometryRecord> {
    let labels = Labels::of(placemark);
    let mut records = Vec::new();

    if let Some(coords) = placemark.select_first(POINT_PATH) {
        extract_point(coords, &labels, groups, &mut records);
    }
    extract_vertices(placemark, Shape::Line, &labels, groups, &mut records);
    extract_vertices(placemark, Shape::Polygon, &labels, groups, &mut records);
    if let Some(multi) = placemark.find(MULTI_GEOMETRY) {
        extract_multi_geometry(multi, &labels, groups, &mut records);
    }

    debug!(
        name = %labels.name,
        records = records.len(),
        next_group = groups.peek(),
        "extracted placemark"
    );
    records
}

/// Emit one record from the first tuple of a point's coordinates.
fn extract_point(
    coords: &Element,
    labels: &Labels,
    groups: &mut GroupCounter,
    records: &mut Vec<GeometryRecord>,
) {
    let text = coords.text_content();
    if let Some(first) = parse_coordinates(Some(&text)).first() {
        records.push(labels.record(GeometryKind::Point, first, groups.commit(), None));
    }
}

/// Emit every vertex of every line or polygon outer boundary under `scope`.
fn extract_vertices(
    scope: &Element,
    shape: Shape,
    labels: &Labels,
    groups: &mut GroupCounter,
    records: &mut Vec<GeometryRecord>,
) {
    let kind = shape.kind();
    for coords in scope.select(shape.path()) {
        let text = coords.text_content();
        let triples = parse_coordinates(Some(&text));
        if triples.is_empty() {
            debug!(%kind, "skipping geometry without usable coordinates");
            continue;
        }
        let group_id = groups.commit();
        records.extend(
            triples
                .iter()
                .enumerate()
                .map(|(idx, coord)| labels.record(kind, coord, group_id, Some(idx))),
        );
    }
}

/// Every point, line, and polygon inside a `MultiGeometry`.
fn extract_multi_geometry(
    multi: &Element,
    labels: &Labels,
    groups: &mut GroupCounter,
    records: &mut Vec<GeometryRecord>,
) {
    for coords in multi.select(POINT_PATH) {
        extract_point(coords, labels, groups, records);
    }
    extract_vertices(multi, Shape::Line, labels, groups, records);
    extract_vertices(multi, Shape::Polygon, labels, groups, records);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kml(body: &str) -> Document {
        Document::parse(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>{body}</Document></kml>"#
        ))
        .unwrap()
    }

    fn polygon(coords: &str) -> String {
        format!(
            "<Polygon><outerBoundaryIs><LinearRing><coordinates>{coords}</coordinates>\
             </LinearRing></outerBoundaryIs></Polygon>"
        )
    }

    #[test]
    fn test_single_point() {
        let doc = kml(
            "<Placemark><name>A</name><Point><coordinates>-122.08,37.42,5 1,1</coordinates></Point></Placemark>",
        );
        let records = extract_placemarks(&doc).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.kind, GeometryKind::Point);
        assert_eq!(r.name, "A");
        assert_eq!(r.description, "");
        assert_eq!(r.vertex_index, None);
        assert_eq!(r.group_id, 0);
        assert_eq!((r.longitude, r.latitude, r.altitude), (-122.08, 37.42, 5.0));
    }

    #[test]
    fn test_line_string_vertices() {
        let doc = kml(
            "<Placemark><name>Trail</name><LineString><coordinates>1,1 2,2 3,3</coordinates></LineString></Placemark>",
        );
        let records = extract_placemarks(&doc).unwrap();
        assert_eq!(records.len(), 3);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.kind, GeometryKind::Line);
            assert_eq!(r.group_id, 0);
            assert_eq!(r.vertex_index, Some(i));
            assert_eq!(r.longitude, (i + 1) as f64);
        }
    }

    #[test]
    fn test_point_then_polygon_groups() {
        let doc = kml(&format!(
            "<Placemark><name>P</name><Point><coordinates>0,0</coordinates></Point></Placemark>\
             <Placemark><name>Field</name>{}</Placemark>",
            polygon("0,0 1,0 1,1 0,0")
        ));
        let records = extract_placemarks(&doc).unwrap();
        let groups: Vec<u64> = records.iter().map(|r| r.group_id).collect();
        assert_eq!(groups, vec![0, 1, 1, 1, 1]);
        assert_eq!(records[0].kind, GeometryKind::Point);
        let indices: Vec<Option<usize>> = records[1..].iter().map(|r| r.vertex_index).collect();
        assert_eq!(indices, vec![Some(0), Some(1), Some(2), Some(3)]);
        assert!(records[1..].iter().all(|r| r.kind == GeometryKind::Polygon));
    }

    #[test]
    fn test_inner_boundary_ignored() {
        let doc = kml(
            "<Placemark><Polygon>\
               <outerBoundaryIs><LinearRing><coordinates>0,0 4,0 4,4 0,0</coordinates></LinearRing></outerBoundaryIs>\
               <innerBoundaryIs><LinearRing><coordinates>1,1 2,1 2,2 1,1</coordinates></LinearRing></innerBoundaryIs>\
             </Polygon></Placemark>",
        );
        let records = extract_placemarks(&doc).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.longitude == 0.0 || r.longitude == 4.0));
    }

    #[test]
    fn test_no_placemarks() {
        let doc = kml("<Folder><name>empty</name></Folder>");
        assert!(matches!(
            extract_placemarks(&doc),
            Err(ConvertError::NoGeometryFound)
        ));
    }

    #[test]
    fn test_placemark_without_geometry() {
        let doc = kml(
            "<Placemark><name>nowhere</name></Placemark>\
             <Placemark><Point><coordinates>   </coordinates></Point></Placemark>\
             <Placemark><LineString><coordinates>abc,1</coordinates></LineString></Placemark>",
        );
        assert!(matches!(
            extract_placemarks(&doc),
            Err(ConvertError::NoGeometryFound)
        ));
    }

    #[test]
    fn test_empty_geometry_consumes_no_group() {
        let doc = kml(
            "<Placemark><LineString><coordinates></coordinates></LineString>\
             <LineString><coordinates>5,5 6,6</coordinates></LineString></Placemark>\
             <Placemark><Point><coordinates>7,7</coordinates></Point></Placemark>",
        );
        let records = extract_placemarks(&doc).unwrap();
        let groups: Vec<u64> = records.iter().map(|r| r.group_id).collect();
        assert_eq!(groups, vec![0, 0, 1]);
    }

    #[test]
    fn test_dropped_tuples_keep_indices_dense() {
        let doc = kml(
            "<Placemark><LineString><coordinates>1,1 bad,2 3,3</coordinates></LineString></Placemark>",
        );
        let records = extract_placemarks(&doc).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].vertex_index, Some(1));
        assert_eq!(records[1].longitude, 3.0);
    }

    #[test]
    fn test_multi_geometry_emitted_twice() {
        // Direct searches reach into the MultiGeometry as well, so each nested
        // geometry appears once per pass.
        let doc = kml(&format!(
            "<Placemark><name>Campus</name><description>Main, North</description><MultiGeometry>\
               <Point><coordinates>9,9</coordinates></Point>\
               <Point><coordinates>8,8</coordinates></Point>\
               <LineString><coordinates>1,1 2,2</coordinates></LineString>\
               {}\
             </MultiGeometry></Placemark>",
            polygon("0,0 1,0 0,0")
        ));
        let records = extract_placemarks(&doc).unwrap();

        let summary: Vec<(GeometryKind, u64, Option<usize>)> = records
            .iter()
            .map(|r| (r.kind, r.group_id, r.vertex_index))
            .collect();
        assert_eq!(
            summary,
            vec![
                // Direct pass: first point only, then every line and polygon.
                (GeometryKind::Point, 0, None),
                (GeometryKind::Line, 1, Some(0)),
                (GeometryKind::Line, 1, Some(1)),
                (GeometryKind::Polygon, 2, Some(0)),
                (GeometryKind::Polygon, 2, Some(1)),
                (GeometryKind::Polygon, 2, Some(2)),
                // MultiGeometry pass: every point.
                (GeometryKind::Point, 3, None),
                (GeometryKind::Point, 4, None),
                (GeometryKind::Line, 5, Some(0)),
                (GeometryKind::Line, 5, Some(1)),
                (GeometryKind::Polygon, 6, Some(0)),
                (GeometryKind::Polygon, 6, Some(1)),
                (GeometryKind::Polygon, 6, Some(2)),
            ]
        );
        assert_eq!(records[6].longitude, 9.0);
        assert_eq!(records[7].longitude, 8.0);
        assert!(records
            .iter()
            .all(|r| r.name == "Campus" && r.description == "Main, North"));
    }

    #[test]
    fn test_only_vertex_shapes_are_indexed() {
        let doc = kml(&format!(
            "<Placemark><Point><coordinates>1,1 2,2</coordinates></Point>\
               <LineString><coordinates>3,3 4,4</coordinates></LineString>{}\
               <MultiGeometry><Point><coordinates>5,5</coordinates></Point></MultiGeometry>\
             </Placemark>",
            polygon("0,0 1,0 0,0")
        ));
        let records = extract_placemarks(&doc).unwrap();
        for r in &records {
            assert_eq!(r.vertex_index.is_none(), r.kind == GeometryKind::Point, "{r:?}");
        }
        assert_eq!(Shape::Line.kind(), GeometryKind::Line);
        assert_eq!(Shape::Polygon.path().last(), Some(&"coordinates"));
    }

    #[test]
    fn test_labels_trimmed() {
        let doc = kml(
            "<Placemark><name>\n   Spaced  \n</name><description><![CDATA[ <b>x</b> ]]></description>\
             <Point><coordinates>1,2</coordinates></Point></Placemark>",
        );
        let records = extract_placemarks(&doc).unwrap();
        assert_eq!(records[0].name, "Spaced");
        assert_eq!(records[0].description, "<b>x</b>");
    }

    #[test]
    fn test_placemark_counter_threads_through() {
        let doc = kml(
            "<Placemark><Point><coordinates>1,2</coordinates></Point></Placemark>",
        );
        let placemark = doc.elements_by_name("Placemark")[0];
        let mut groups = GroupCounter::new();
        groups.commit();
        groups.commit();
        let records = extract_placemark(placemark, &mut groups);
        assert_eq!(records[0].group_id, 2);
        assert_eq!(groups.peek(), 3);
    }

    #[test]
    fn test_nested_folders() {
        let doc = kml(
            "<Folder><Folder><Placemark><Point><coordinates>1,2</coordinates></Point></Placemark></Folder>\
             <Placemark><Point><coordinates>3,4</coordinates></Point></Placemark></Folder>",
        );
        let records = extract_placemarks(&doc).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].longitude, 1.0);
        assert_eq!(records[1].group_id, 1);
    }
}
