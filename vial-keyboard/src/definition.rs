//! Keyboard definition (vial.json) decoding
//!
//! The firmware stores its definition as xz-compressed JSON. Only the parts
//! the client needs are modelled; everything else is ignored.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::KeyboardError;
use crate::keycode::CustomKeycode;

/// Switch matrix dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Matrix {
    pub rows: u8,
    pub cols: u8,
}

impl Matrix {
    /// Number of key positions per layer
    pub fn key_count(&self) -> usize {
        usize::from(self.rows) * usize::from(self.cols)
    }
}

/// KLE layout data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Layouts {
    /// Rows of KLE entries: label strings mixed with property objects
    #[serde(default)]
    pub keymap: Vec<Vec<Value>>,
}

/// Decoded keyboard definition
#[derive(Debug, Clone, Deserialize)]
pub struct KeyboardDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub matrix: Matrix,
    #[serde(rename = "customKeycodes", default)]
    pub custom_keycodes: Vec<CustomKeycode>,
    #[serde(default)]
    pub layouts: Layouts,
}

impl KeyboardDefinition {
    pub fn from_json(json: &[u8]) -> Result<Self, KeyboardError> {
        serde_json::from_slice(json).map_err(|e| KeyboardError::Definition(e.to_string()))
    }

    /// Decompress and parse the blob read from the device
    pub fn from_compressed(blob: &[u8]) -> Result<Self, KeyboardError> {
        let json = xz_decompress(blob)?;
        debug!("Definition: {} compressed -> {} bytes", blob.len(), json.len());
        Self::from_json(&json)
    }

    /// Number of rotary encoders
    ///
    /// Encoder labels in the KLE keymap look like `"<index>,<dir>...e"`; the
    /// count is one past the highest index seen.
    pub fn encoder_count(&self) -> usize {
        self.layouts
            .keymap
            .iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|label| label.ends_with('e'))
            .filter_map(|label| label.split(',').next()?.trim().parse::<usize>().ok())
            .map(|idx| idx + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Decompress an xz stream
pub fn xz_decompress(blob: &[u8]) -> Result<Vec<u8>, KeyboardError> {
    let mut out = Vec::new();
    lzma_rs::xz_decompress(&mut &blob[..], &mut out)
        .map_err(|e| KeyboardError::Definition(format!("xz: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "Test 4x12",
        "matrix": {"rows": 4, "cols": 12},
        "customKeycodes": [
            {"name": "CK_RGB", "title": "Toggle RGB", "shortName": "RGB"}
        ],
        "layouts": {
            "keymap": [
                ["0,0", {"x": 0.5}, "0,1", "0,0\n\n\n\n\n\n\n\n\ne", "0,1\n\n\n\n\n\n\n\n\ne"],
                ["1,0", "2,0\n\n\n\n\n\n\n\n\ne"]
            ]
        }
    }"#;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        lzma_rs::xz_compress(&mut &data[..], &mut out).unwrap();
        out
    }

    #[test]
    fn test_parse_definition() {
        let def = KeyboardDefinition::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(def.name.as_deref(), Some("Test 4x12"));
        assert_eq!(def.matrix, Matrix { rows: 4, cols: 12 });
        assert_eq!(def.matrix.key_count(), 48);
        assert_eq!(def.custom_keycodes.len(), 1);
        assert_eq!(def.custom_keycodes[0].short_name, "RGB");
    }

    #[test]
    fn test_encoder_count() {
        let def = KeyboardDefinition::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(def.encoder_count(), 3);
    }

    #[test]
    fn test_no_encoders() {
        let def =
            KeyboardDefinition::from_json(br#"{"matrix": {"rows": 1, "cols": 2}}"#).unwrap();
        assert_eq!(def.encoder_count(), 0);
        assert!(def.custom_keycodes.is_empty());
    }

    #[test]
    fn test_from_compressed() {
        let blob = compress(SAMPLE.as_bytes());
        let def = KeyboardDefinition::from_compressed(&blob).unwrap();
        assert_eq!(def.matrix.cols, 12);
    }

    #[test]
    fn test_bad_blob() {
        let err = KeyboardDefinition::from_compressed(b"not xz").unwrap_err();
        assert!(matches!(err, KeyboardError::Definition(_)));
    }
}
