use std::{fs, path::Path};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Result, Style};

/// Top-level configuration for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub style: Style,
    /// Name given to the generated Show function.
    pub show_name: String,
    /// Author recorded in the workspace creator block.
    pub author: String,
    /// How close (in beats) a segment start must be to a scheduled cue for the
    /// two to be treated as the same boundary.
    pub boundary_tolerance_beats: f64,
    /// Palette entry reserved for blackout and kept out of the color rotation.
    pub blackout_color: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            style: Style::Moderate,
            show_name: "Generated Light Show".to_string(),
            author: "beatlight".to_string(),
            boundary_tolerance_beats: 0.5,
            blackout_color: "off".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn with_style(style: Style) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }
}

/// Reads a JSON payload from disk into `T`.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let text = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: GeneratorConfig = serde_json::from_str(r#"{"style": "dramatic"}"#).unwrap();
        assert_eq!(config.style, Style::Dramatic);
        assert_eq!(config.blackout_color, "off");
        assert_eq!(config.boundary_tolerance_beats, 0.5);
    }

    #[test]
    fn load_json_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_json::<GeneratorConfig>(dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.kind(), "Io");
    }
}
