//! Preset persistence: save/load a [`StabilizerParams`] as JSON.
//!
//! Gated behind the `presets` feature, which is also what turns on the
//! `serde`/`serde_json` dependencies: hosts that never save or load a
//! preset don't pay for JSON support.

use std::io;
use std::path::Path;

use crate::params::{validate, StabilizerParams};

/// Abstracts where presets live. [`FilePresetStore`] is the default,
/// filesystem-backed implementation; hosts embedding this crate in a
/// sandboxed plugin can supply their own.
pub trait PresetStore {
    fn save(&self, name: &str, params: &StabilizerParams, description: Option<&str>) -> io::Result<()>;
    fn load(&self, name: &str) -> io::Result<StabilizerParams>;
}

/// The on-disk shape of one preset: a human-readable name and optional
/// description alongside the tunable fields, flattened into the same object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PresetFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(flatten)]
    params: StabilizerParams,
}

/// Stores one preset per file, named `<name>.json`, under a directory.
#[derive(Debug, Clone)]
pub struct FilePresetStore {
    dir: std::path::PathBuf,
}

impl FilePresetStore {
    #[must_use]
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> std::path::PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl PresetStore for FilePresetStore {
    fn save(&self, name: &str, params: &StabilizerParams, description: Option<&str>) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let file = PresetFile {
            name: name.to_string(),
            description: description.map(str::to_string),
            params: *params,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(self.path_for(name), json)
    }

    fn load(&self, name: &str) -> io::Result<StabilizerParams> {
        let text = std::fs::read_to_string(self.path_for(name))?;
        let parsed: PresetFile = serde_json::from_str(&text)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        // A preset file may have been hand-edited or carried forward from an
        // older version with different valid ranges; repair rather than fail.
        Ok(validate(parsed.params))
    }
}

/// Whether `path` looks like one of this store's preset files, by extension.
#[must_use]
pub fn is_preset_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_validated_params() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePresetStore::new(dir.path());
        let original = StabilizerParams::handheld();
        store.save("handheld", &original, Some("smooths handheld footage")).expect("save");
        let loaded = store.load("handheld").expect("load");
        assert_eq!(loaded, original);
    }

    #[test]
    fn saved_file_embeds_name_and_description() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePresetStore::new(dir.path());
        let original = StabilizerParams::handheld();
        store.save("handheld", &original, Some("smooths handheld footage")).expect("save");
        let text = std::fs::read_to_string(dir.path().join("handheld.json")).expect("read");
        assert!(text.contains("\"name\": \"handheld\""));
        assert!(text.contains("smooths handheld footage"));
    }

    #[test]
    fn description_is_optional() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePresetStore::new(dir.path());
        let original = StabilizerParams::handheld();
        store.save("handheld", &original, None).expect("save");
        let loaded = store.load("handheld").expect("load");
        assert_eq!(loaded, original);
    }

    #[test]
    fn loading_missing_preset_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePresetStore::new(dir.path());
        assert!(store.load("nonexistent").is_err());
    }

    #[test]
    fn load_repairs_out_of_range_legacy_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePresetStore::new(dir.path());
        let bad_json = r#"{
            "enabled": true,
            "smoothing_radius": 99999,
            "max_correction": 30.0,
            "feature_count": 500,
            "quality_level": 0.01,
            "min_distance": 30.0,
            "block_size": 3,
            "use_harris": false,
            "harris_k": 0.04,
            "tracking_error_threshold": 50.0,
            "ransac_threshold_min": 1.0,
            "ransac_threshold_max": 10.0,
            "min_point_spread": 10.0,
            "max_displacement": 1000.0,
            "edge_mode": "Padding",
            "frame_motion_threshold": 0.25
        }"#;
        std::fs::write(dir.path().join("legacy.json"), bad_json).expect("write");
        let loaded = store.load("legacy").expect("load");
        assert!(loaded.smoothing_radius <= crate::constants::SMOOTHING_RADIUS_RANGE.1);
    }

    #[test]
    fn is_preset_file_checks_extension() {
        assert!(is_preset_file(Path::new("handheld.json")));
        assert!(!is_preset_file(Path::new("handheld.toml")));
    }
}
