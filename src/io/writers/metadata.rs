use gdal::Dataset;
use gdal::Metadata;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::io::gdal::GdalError;
use crate::products::ProductInfo;

/// Dataset-level tags written with every stack.
pub fn stack_tags(
    info: &ProductInfo,
    band_names: &[String],
    scale_factor: Option<f64>,
) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("PRODUCT".to_string(), info.name.clone());
    tags.insert("CONDENSED_NAME".to_string(), info.condensed_name.clone());
    tags.insert("SENSOR".to_string(), info.sensor.tag().to_string());
    tags.insert("PRODUCT_TYPE".to_string(), info.product_type.clone());
    tags.insert(
        "ACQUISITION_DATETIME".to_string(),
        info.datetime.format("%Y-%m-%dT%H:%M:%S").to_string(),
    );
    tags.insert("BANDS".to_string(), band_names.join(","));
    if let Some(scale) = scale_factor {
        tags.insert("SCALE_FACTOR".to_string(), scale.to_string());
    }
    tags.insert(
        "EOBANDS_VERSION".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    tags
}

/// Embed tags into a GDAL dataset (domain "").
pub fn embed_tags(
    ds: &mut Dataset,
    tags: &BTreeMap<String, String>,
) -> std::result::Result<(), GdalError> {
    for (key, value) in tags {
        ds.set_metadata_item(key, value, "")?;
    }
    Ok(())
}

/// Convert tags to JSON values, lowercasing keys and parsing numbers.
pub fn convert_metadata_to_json(
    metadata: &BTreeMap<String, String>,
) -> HashMap<String, serde_json::Value> {
    let mut json_metadata = HashMap::new();
    for (key, value) in metadata {
        let json_key = key.to_lowercase();
        let json_value = match value.parse::<f64>() {
            Ok(num) => serde_json::Number::from_f64(num)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(value.clone())),
            Err(_) => serde_json::Value::String(value.clone()),
        };
        json_metadata.insert(json_key, json_value);
    }
    json_metadata
}

/// Write a `<output>.json` sidecar next to a raster.
pub fn write_json_sidecar(output_path: &Path, tags: &BTreeMap<String, String>) -> Result<()> {
    let json_metadata = convert_metadata_to_json(tags);
    let sidecar_path = output_path.with_extension("json");
    let json_string = serde_json::to_string_pretty(&json_metadata)?;
    std::fs::write(&sidecar_path, json_string)?;
    info!("Created metadata sidecar: {:?}", sidecar_path);
    Ok(())
}
