//! Optical sensors: Sentinel-2 MSI, Sentinel-3 OLCI/SLSTR and DIMAP (Pleiades, SPOT-6/7).
use crate::core::geometry::Polygon;
use crate::error::{Error, Result};
use crate::io::xml::{XmlDoc, XmlElement};

pub mod dimap;
pub mod s2;
pub mod s3;

pub use dimap::DimapProduct;
pub use s2::S2Product;
pub use s3::S3Product;

/// Coordinates of a `posList`, grouped by `srsDimension` (default 2).
pub(crate) fn parse_pos_list(el: &XmlElement) -> Result<Vec<(f64, f64)>> {
    let dim: usize = el
        .attr("srsDimension")
        .and_then(|d| d.parse().ok())
        .unwrap_or(2)
        .max(2);
    let values = el
        .text
        .split_whitespace()
        .map(|v| v.parse::<f64>())
        .collect::<std::result::Result<Vec<f64>, _>>()
        .map_err(|e| Error::invalid_product(format!("bad posList: {e}")))?;
    Ok(values.chunks_exact(dim).map(|c| (c[0], c[1])).collect())
}

/// Polygons of a GML mask, each tagged with its `maskType` when present.
///
/// Only exterior rings are kept; holes in cloud masks are rare and small.
pub(crate) fn parse_gml_masks(text: &str) -> Result<Vec<(Option<String>, Polygon)>> {
    let doc = XmlDoc::parse(text)?;
    let mut out = Vec::new();
    let features = doc.root.descendants("MaskFeature");
    if features.is_empty() {
        for pos in doc.root.descendants("posList") {
            out.push((None, Polygon::new(parse_pos_list(pos)?)));
        }
        return Ok(out);
    }
    for feature in features {
        let mask_type = feature.text_of("maskType").map(|t| t.to_uppercase());
        let exterior = feature.find("exterior").unwrap_or(feature);
        if let Some(pos) = exterior.find("posList") {
            out.push((mask_type, Polygon::new(parse_pos_list(pos)?)));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gml_mask_types_and_3d_coordinates() {
        let gml = r#"<eop:Mask xmlns:eop="http://www.opengis.net/eop/2.0" xmlns:gml="http://www.opengis.net/gml/3.2">
  <eop:maskMembers>
    <eop:MaskFeature gml:id="OPAQUE.1">
      <eop:maskType codeSpace="urn:fake">OPAQUE</eop:maskType>
      <eop:extentOf><gml:Polygon><gml:exterior><gml:LinearRing>
        <gml:posList srsDimension="3">0 0 1 10 0 1 10 10 1 0 10 1 0 0 1</gml:posList>
      </gml:LinearRing></gml:exterior></gml:Polygon></eop:extentOf>
    </eop:MaskFeature>
    <eop:MaskFeature gml:id="CIRRUS.1">
      <eop:maskType>CIRRUS</eop:maskType>
      <eop:extentOf><gml:Polygon><gml:exterior><gml:LinearRing>
        <gml:posList>20 20 30 20 30 30</gml:posList>
      </gml:LinearRing></gml:exterior></gml:Polygon></eop:extentOf>
    </eop:MaskFeature>
  </eop:maskMembers>
</eop:Mask>"#;
        let masks = parse_gml_masks(gml).unwrap();
        assert_eq!(masks.len(), 2);
        assert_eq!(masks[0].0.as_deref(), Some("OPAQUE"));
        assert_eq!(masks[0].1.exterior.len(), 4);
        assert!(masks[0].1.contains(5.0, 5.0));
        assert_eq!(masks[1].0.as_deref(), Some("CIRRUS"));
    }
}
