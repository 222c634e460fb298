//! Persistence of feature and consensus maps as featureXML/consensusXML
//! documents.
//!
//! The format carries positions, intensities, charges, qualities, convex
//! hulls and subordinate features, and 64-bit unique ids round-trip
//! exactly as decimal strings.
use std::io::{BufRead, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::feature::{
    ColumnHeader, ConsensusFeature, ConsensusMap, Feature, FeatureHandle, FeatureMap,
};

#[derive(Debug, Error)]
pub enum FeatureXmlError {
    #[error("An XML error occurred: {0}")]
    Xml(String),
    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed document: {0}")]
    Malformed(String),
}

impl From<quick_xml::Error> for FeatureXmlError {
    fn from(value: quick_xml::Error) -> Self {
        FeatureXmlError::Xml(value.to_string())
    }
}

// Attribute values are pushed owned so short-lived strings can be used
// without tying the element's lifetime to them.
fn push_attr(tag: &mut BytesStart, key: &'static str, value: String) {
    tag.push_attribute(quick_xml::events::attributes::Attribute {
        key: quick_xml::name::QName(key.as_bytes()),
        value: std::borrow::Cow::Owned(value.into_bytes()),
    });
}

fn get_attr(start: &BytesStart, key: &[u8]) -> Result<Option<String>, FeatureXmlError> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| FeatureXmlError::Xml(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| FeatureXmlError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attrs: &[(&str, String)],
    content: &str,
) -> Result<(), FeatureXmlError> {
    let mut tag = BytesStart::new(name);
    for (key, value) in attrs {
        tag.push_attribute((*key, value.as_str()));
    }
    writer.write_event(Event::Start(tag))?;
    writer.write_event(Event::Text(BytesText::new(content)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_feature_body<W: Write>(
    writer: &mut Writer<W>,
    feature: &Feature,
) -> Result<(), FeatureXmlError> {
    let mut tag = BytesStart::new("feature");
    push_attr(&mut tag, "id", format!("f_{}", feature.unique_id));
    writer.write_event(Event::Start(tag))?;
    text_element(writer, "position", &[("dim", "0".to_string())], &feature.rt.to_string())?;
    text_element(writer, "position", &[("dim", "1".to_string())], &feature.mz.to_string())?;
    text_element(writer, "intensity", &[], &feature.intensity.to_string())?;
    text_element(writer, "quality", &[("dim", "0".to_string())], &feature.qualities[0].to_string())?;
    text_element(writer, "quality", &[("dim", "1".to_string())], &feature.qualities[1].to_string())?;
    text_element(writer, "overallquality", &[], &feature.overall_quality.to_string())?;
    text_element(writer, "charge", &[], &feature.charge.to_string())?;
    for (nr, hull) in feature.convex_hulls.iter().enumerate() {
        let mut hull_tag = BytesStart::new("convexhull");
        push_attr(&mut hull_tag, "nr", nr.to_string());
        writer.write_event(Event::Start(hull_tag))?;
        for (x, y) in hull.points() {
            let mut pt = BytesStart::new("pt");
            push_attr(&mut pt, "x", x.to_string());
            push_attr(&mut pt, "y", y.to_string());
            writer.write_event(Event::Empty(pt))?;
        }
        writer.write_event(Event::End(BytesEnd::new("convexhull")))?;
    }
    if !feature.subordinates.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("subordinate")))?;
        for subordinate in feature.subordinates.iter() {
            write_feature_body(writer, subordinate)?;
        }
        writer.write_event(Event::End(BytesEnd::new("subordinate")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("feature")))?;
    Ok(())
}

/// Serialize a feature map as featureXML.
pub fn write_feature_map<W: Write>(map: &FeatureMap, sink: W) -> Result<(), FeatureXmlError> {
    let mut writer = Writer::new_with_indent(sink, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut root = BytesStart::new("featureMap");
    root.push_attribute(("version", "1.9"));
    writer.write_event(Event::Start(root))?;
    let mut list = BytesStart::new("featureList");
    push_attr(&mut list, "count", map.len().to_string());
    writer.write_event(Event::Start(list))?;
    for feature in map.iter() {
        write_feature_body(&mut writer, feature)?;
    }
    writer.write_event(Event::End(BytesEnd::new("featureList")))?;
    writer.write_event(Event::End(BytesEnd::new("featureMap")))?;
    Ok(())
}

fn parse_unique_id(raw: &str) -> Result<u64, FeatureXmlError> {
    raw.trim_start_matches("f_")
        .trim_start_matches("e_")
        .parse()
        .map_err(|_| FeatureXmlError::Malformed(format!("invalid unique id '{}'", raw)))
}

/// Parse a featureXML document.
pub fn read_feature_map<R: BufRead>(source: R) -> Result<FeatureMap, FeatureXmlError> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);
    let mut buffer = Vec::new();

    let mut map = FeatureMap::new();
    // The feature currently being built at each nesting depth; subordinate
    // features stack on top of their parent.
    let mut stack: Vec<Feature> = Vec::new();
    let mut text_target: Option<(String, String)> = None;
    let mut hull_points: Option<Vec<(f64, f64)>> = None;

    loop {
        buffer.clear();
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"feature" => {
                    let id = get_attr(&start, b"id")?.unwrap_or_default();
                    stack.push(Feature {
                        unique_id: parse_unique_id(&id)?,
                        ..Default::default()
                    });
                }
                b"position" | b"quality" => {
                    let dim = get_attr(&start, b"dim")?.unwrap_or_default();
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    text_target = Some((name, dim));
                }
                b"intensity" | b"overallquality" | b"charge" => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    text_target = Some((name, String::new()));
                }
                b"convexhull" => hull_points = Some(Vec::new()),
                _ => {}
            },
            Ok(Event::Empty(start)) => {
                if start.name().as_ref() == b"pt" {
                    if let Some(points) = hull_points.as_mut() {
                        let x = get_attr(&start, b"x")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or_default();
                        let y = get_attr(&start, b"y")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or_default();
                        points.push((x, y));
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let content = text
                    .unescape()
                    .map_err(|e| FeatureXmlError::Xml(e.to_string()))?
                    .into_owned();
                if let (Some((name, dim)), Some(feature)) =
                    (text_target.take(), stack.last_mut())
                {
                    match (name.as_str(), dim.as_str()) {
                        ("position", "0") => feature.rt = content.parse().unwrap_or_default(),
                        ("position", "1") => feature.mz = content.parse().unwrap_or_default(),
                        ("quality", "0") => {
                            feature.qualities[0] = content.parse().unwrap_or_default()
                        }
                        ("quality", "1") => {
                            feature.qualities[1] = content.parse().unwrap_or_default()
                        }
                        ("intensity", _) => {
                            feature.intensity = content.parse().unwrap_or_default()
                        }
                        ("overallquality", _) => {
                            feature.overall_quality = content.parse().unwrap_or_default()
                        }
                        ("charge", _) => feature.charge = content.parse().unwrap_or_default(),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(end)) => match end.name().as_ref() {
                b"feature" => {
                    let finished = stack.pop().ok_or_else(|| {
                        FeatureXmlError::Malformed("unbalanced feature element".into())
                    })?;
                    if let Some(parent) = stack.last_mut() {
                        parent.subordinates.push(finished);
                    } else {
                        map.push(finished);
                    }
                }
                b"convexhull" => {
                    if let (Some(points), Some(feature)) = (hull_points.take(), stack.last_mut())
                    {
                        feature.add_convex_hull(&points);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FeatureXmlError::Xml(e.to_string())),
        }
    }
    Ok(map)
}

/// Serialize a consensus map as consensusXML.
pub fn write_consensus_map<W: Write>(map: &ConsensusMap, sink: W) -> Result<(), FeatureXmlError> {
    let mut writer = Writer::new_with_indent(sink, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut root = BytesStart::new("consensusXML");
    root.push_attribute(("version", "1.7"));
    writer.write_event(Event::Start(root))?;

    let mut map_list = BytesStart::new("mapList");
    push_attr(&mut map_list, "count", map.column_headers.len().to_string());
    writer.write_event(Event::Start(map_list))?;
    for (index, header) in map.column_headers.iter() {
        let mut tag = BytesStart::new("map");
        push_attr(&mut tag, "id", index.to_string());
        tag.push_attribute(("name", header.filename.as_str()));
        tag.push_attribute(("label", header.label.as_str()));
        push_attr(&mut tag, "size", header.size.to_string());
        push_attr(&mut tag, "unique_id", header.unique_id.to_string());
        writer.write_event(Event::Empty(tag))?;
    }
    writer.write_event(Event::End(BytesEnd::new("mapList")))?;

    let mut element_list = BytesStart::new("consensusElementList");
    push_attr(&mut element_list, "count", map.len().to_string());
    writer.write_event(Event::Start(element_list))?;
    for feature in map.iter() {
        let mut element = BytesStart::new("consensusElement");
        push_attr(&mut element, "id", format!("e_{}", feature.unique_id));
        push_attr(&mut element, "quality", feature.quality.to_string());
        push_attr(&mut element, "charge", feature.charge.to_string());
        writer.write_event(Event::Start(element))?;

        let mut centroid = BytesStart::new("centroid");
        push_attr(&mut centroid, "rt", feature.rt.to_string());
        push_attr(&mut centroid, "mz", feature.mz.to_string());
        push_attr(&mut centroid, "it", feature.intensity.to_string());
        writer.write_event(Event::Empty(centroid))?;

        writer.write_event(Event::Start(BytesStart::new("groupedElementList")))?;
        for handle in feature.handles.iter() {
            let mut tag = BytesStart::new("element");
            push_attr(&mut tag, "map", handle.map_index.to_string());
            push_attr(&mut tag, "id", handle.unique_id.to_string());
            push_attr(&mut tag, "rt", handle.rt.to_string());
            push_attr(&mut tag, "mz", handle.mz.to_string());
            push_attr(&mut tag, "it", handle.intensity.to_string());
            push_attr(&mut tag, "charge", handle.charge.to_string());
            writer.write_event(Event::Empty(tag))?;
        }
        writer.write_event(Event::End(BytesEnd::new("groupedElementList")))?;
        writer.write_event(Event::End(BytesEnd::new("consensusElement")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("consensusElementList")))?;
    writer.write_event(Event::End(BytesEnd::new("consensusXML")))?;
    Ok(())
}

/// Parse a consensusXML document.
pub fn read_consensus_map<R: BufRead>(source: R) -> Result<ConsensusMap, FeatureXmlError> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);
    let mut buffer = Vec::new();

    let mut map = ConsensusMap::new();
    let mut current: Option<ConsensusFeature> = None;

    loop {
        buffer.clear();
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => match start.name().as_ref() {
                b"map" => {
                    let index: u64 = get_attr(&start, b"id")?
                        .and_then(|v| v.parse().ok())
                        .ok_or_else(|| {
                            FeatureXmlError::Malformed("map element without numeric id".into())
                        })?;
                    map.column_headers.insert(
                        index,
                        ColumnHeader {
                            filename: get_attr(&start, b"name")?.unwrap_or_default(),
                            label: get_attr(&start, b"label")?.unwrap_or_default(),
                            size: get_attr(&start, b"size")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or_default(),
                            unique_id: get_attr(&start, b"unique_id")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or_default(),
                        },
                    );
                }
                b"consensusElement" => {
                    let id = get_attr(&start, b"id")?.unwrap_or_default();
                    current = Some(ConsensusFeature {
                        unique_id: parse_unique_id(&id)?,
                        quality: get_attr(&start, b"quality")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or_default(),
                        charge: get_attr(&start, b"charge")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or_default(),
                        ..Default::default()
                    });
                }
                b"centroid" => {
                    if let Some(feature) = current.as_mut() {
                        feature.rt = get_attr(&start, b"rt")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or_default();
                        feature.mz = get_attr(&start, b"mz")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or_default();
                        feature.intensity = get_attr(&start, b"it")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or_default();
                    }
                }
                b"element" => {
                    if let Some(feature) = current.as_mut() {
                        feature.insert(FeatureHandle {
                            map_index: get_attr(&start, b"map")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or_default(),
                            unique_id: get_attr(&start, b"id")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or_default(),
                            rt: get_attr(&start, b"rt")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or_default(),
                            mz: get_attr(&start, b"mz")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or_default(),
                            intensity: get_attr(&start, b"it")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or_default(),
                            charge: get_attr(&start, b"charge")?
                                .and_then(|v| v.parse().ok())
                                .unwrap_or_default(),
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::End(end)) => {
                if end.name().as_ref() == b"consensusElement" {
                    if let Some(feature) = current.take() {
                        map.push(feature);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FeatureXmlError::Xml(e.to_string())),
        }
    }
    Ok(map)
}
