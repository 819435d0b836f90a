use std::{collections::BTreeMap, ops::Range, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{config, Result, ShowGenError};

/// Highest addressable channel in a DMX universe (1-based).
pub const DMX_UNIVERSE_SIZE: u32 = 512;

/// Fixture inventory payload as supplied by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureConfigPayload {
    pub fixtures: Vec<FixturePayload>,
    /// Color name to `[r, g, b]`; declaration order is the rotation order.
    pub color_palette: serde_json::Map<String, Value>,
    /// Optional subset and ordering of palette colors used for the rotation.
    #[serde(default)]
    pub color_rotation: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixturePayload {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub mode: String,
    pub universe: i64,
    pub address: i64,
    pub channels: i64,
    pub channel_map: BTreeMap<String, i64>,
}

/// Patched fixture with addresses in the 1-based configuration convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: u32,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub mode: String,
    pub universe: u32,
    pub address: u32,
    pub channel_count: u32,
    /// Semantic channel name to zero-based offset inside the fixture block.
    pub channel_map: BTreeMap<String, u32>,
}

impl Fixture {
    /// Channels occupied by the fixture, `[address, address + channel_count)`.
    pub fn block(&self) -> Range<u32> {
        self.address..self.address + self.channel_count
    }

    /// Offset of a semantic channel, e.g. `red` or `intensity`.
    pub fn channel(&self, name: &str) -> Option<u32> {
        self.channel_map.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedColor {
    pub name: String,
    pub rgb: Rgb,
}

/// Ordered color palette keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorPalette {
    colors: Vec<NamedColor>,
}

impl ColorPalette {
    pub fn get(&self, name: &str) -> Option<Rgb> {
        self.colors
            .iter()
            .find(|color| color.name == name)
            .map(|color| color.rgb)
    }

    pub fn colors(&self) -> &[NamedColor] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    fn from_payload(entries: serde_json::Map<String, Value>) -> Result<Self> {
        if entries.is_empty() {
            return Err(ShowGenError::InvalidPalette(
                "color palette must contain at least one color".into(),
            ));
        }

        let colors = entries
            .into_iter()
            .map(|(name, value)| {
                let rgb = parse_rgb(&name, &value)?;
                Ok(NamedColor { name, rgb })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { colors })
    }
}

fn parse_rgb(name: &str, value: &Value) -> Result<Rgb> {
    let bad = || {
        ShowGenError::InvalidPalette(format!(
            "color `{name}` must be an [r, g, b] triple of 0-255 integers, got {value}"
        ))
    };

    let components = value.as_array().ok_or_else(bad)?;
    if components.len() != 3 {
        return Err(bad());
    }

    let mut rgb = [0u8; 3];
    for (slot, component) in rgb.iter_mut().zip(components) {
        let raw = component.as_u64().ok_or_else(bad)?;
        *slot = u8::try_from(raw).map_err(|_| bad())?;
    }

    Ok(Rgb::new(rgb[0], rgb[1], rgb[2]))
}

/// Validated fixture inventory plus its color palette.
#[derive(Debug, Clone)]
pub struct FixtureRegistry {
    fixtures: Vec<Fixture>,
    palette: ColorPalette,
    rotation: Vec<NamedColor>,
    blackout: Option<Rgb>,
}

impl FixtureRegistry {
    /// Reads and validates a fixture configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>, blackout_color: &str) -> Result<Self> {
        let payload: FixtureConfigPayload = config::load_json(path)?;
        Self::from_payload(payload, blackout_color)
    }

    /// Validates the payload. Fixture ids follow declaration order.
    pub fn from_payload(payload: FixtureConfigPayload, blackout_color: &str) -> Result<Self> {
        if payload.fixtures.is_empty() {
            return Err(ShowGenError::InvalidFixture(
                "fixture config must declare at least one fixture".into(),
            ));
        }

        let fixtures = payload
            .fixtures
            .into_iter()
            .enumerate()
            .map(|(index, fixture)| validate_fixture(index as u32, fixture))
            .collect::<Result<Vec<_>>>()?;
        check_overlaps(&fixtures)?;

        let palette = ColorPalette::from_payload(payload.color_palette)?;

        let selected: Vec<NamedColor> = if payload.color_rotation.is_empty() {
            palette.colors().to_vec()
        } else {
            payload
                .color_rotation
                .iter()
                .map(|name| {
                    palette
                        .get(name)
                        .map(|rgb| NamedColor {
                            name: name.clone(),
                            rgb,
                        })
                        .ok_or_else(|| {
                            ShowGenError::InvalidPalette(format!(
                                "color rotation references `{name}` which is not in the palette"
                            ))
                        })
                })
                .collect::<Result<_>>()?
        };
        let rotation: Vec<NamedColor> = selected
            .into_iter()
            .filter(|color| color.name != blackout_color)
            .collect();
        if rotation.is_empty() {
            return Err(ShowGenError::InvalidPalette(format!(
                "no rotation colors remain after reserving `{blackout_color}` for blackout"
            )));
        }

        let blackout = palette.get(blackout_color);

        tracing::debug!(
            fixtures = fixtures.len(),
            colors = palette.len(),
            rotation = rotation.len(),
            "fixture registry validated"
        );

        Ok(Self {
            fixtures,
            palette,
            rotation,
            blackout,
        })
    }

    /// Fixtures in declaration order.
    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn fixture(&self, id: u32) -> Option<&Fixture> {
        self.fixtures.iter().find(|fixture| fixture.id == id)
    }

    pub fn palette(&self) -> &ColorPalette {
        &self.palette
    }

    /// Palette color by name.
    pub fn color(&self, name: &str) -> Result<Rgb> {
        self.palette.get(name).ok_or_else(|| {
            ShowGenError::InvalidPalette(format!("color `{name}` is not in the palette"))
        })
    }

    /// Colors cycled through by the look synthesizer, blackout excluded.
    pub fn rotation(&self) -> &[NamedColor] {
        &self.rotation
    }

    /// Color reserved for blackout, when the palette declares one.
    pub fn blackout(&self) -> Option<Rgb> {
        self.blackout
    }

    /// Distinct universes in ascending order.
    pub fn universes(&self) -> Vec<u32> {
        let mut universes: Vec<u32> = self.fixtures.iter().map(|f| f.universe).collect();
        universes.sort_unstable();
        universes.dedup();
        universes
    }
}

fn validate_fixture(id: u32, payload: FixturePayload) -> Result<Fixture> {
    let FixturePayload {
        name,
        manufacturer,
        model,
        mode,
        universe,
        address,
        channels,
        channel_map,
    } = payload;

    let invalid = |detail: String| ShowGenError::InvalidFixture(format!("fixture `{name}`: {detail}"));

    if universe < 1 || universe > u32::MAX as i64 {
        return Err(invalid(format!("universe must be 1 or greater, got {universe}")));
    }
    if address < 1 || address > DMX_UNIVERSE_SIZE as i64 {
        return Err(invalid(format!(
            "address must be within 1..={DMX_UNIVERSE_SIZE}, got {address}"
        )));
    }
    if channels < 1
        || channels > DMX_UNIVERSE_SIZE as i64
        || address + channels - 1 > DMX_UNIVERSE_SIZE as i64
    {
        return Err(invalid(format!(
            "{channels} channels starting at {address} do not fit in a universe"
        )));
    }

    let mut offsets = BTreeMap::new();
    for (channel, offset) in channel_map {
        if offset < 0 || offset >= channels {
            return Err(invalid(format!(
                "channel `{channel}` offset {offset} is outside its {channels}-channel block"
            )));
        }
        offsets.insert(channel, offset as u32);
    }

    Ok(Fixture {
        id,
        name,
        manufacturer,
        model,
        mode,
        universe: universe as u32,
        address: address as u32,
        channel_count: channels as u32,
        channel_map: offsets,
    })
}

fn check_overlaps(fixtures: &[Fixture]) -> Result<()> {
    let mut by_universe: BTreeMap<u32, Vec<&Fixture>> = BTreeMap::new();
    for fixture in fixtures {
        by_universe.entry(fixture.universe).or_default().push(fixture);
    }

    for (universe, mut patched) in by_universe {
        patched.sort_by_key(|fixture| fixture.address);
        for pair in patched.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            if second.address < first.block().end {
                return Err(ShowGenError::FixtureConflict(format!(
                    "`{}` (channels {}-{}) overlaps `{}` (channels {}-{}) in universe {universe}",
                    first.name,
                    first.block().start,
                    first.block().end - 1,
                    second.name,
                    second.block().start,
                    second.block().end - 1,
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rgb_fixture(name: &str, universe: i64, address: i64) -> FixturePayload {
        FixturePayload {
            name: name.to_string(),
            manufacturer: "Generic".to_string(),
            model: "RGB Par".to_string(),
            mode: "3 Channel".to_string(),
            universe,
            address,
            channels: 3,
            channel_map: BTreeMap::from([
                ("red".to_string(), 0),
                ("green".to_string(), 1),
                ("blue".to_string(), 2),
            ]),
        }
    }

    pub(crate) fn palette(entries: &[(&str, [u8; 3])]) -> serde_json::Map<String, Value> {
        entries
            .iter()
            .map(|(name, rgb)| (name.to_string(), serde_json::json!(rgb)))
            .collect()
    }

    pub(crate) fn payload(fixtures: Vec<FixturePayload>) -> FixtureConfigPayload {
        FixtureConfigPayload {
            fixtures,
            color_palette: palette(&[
                ("red", [255, 0, 0]),
                ("off", [0, 0, 0]),
                ("blue", [0, 0, 255]),
                ("green", [0, 255, 0]),
            ]),
            color_rotation: Vec::new(),
        }
    }

    #[test]
    fn registers_fixtures_in_declaration_order() {
        let registry = FixtureRegistry::from_payload(
            payload(vec![rgb_fixture("Left", 1, 1), rgb_fixture("Right", 1, 4)]),
            "off",
        )
        .unwrap();

        let names: Vec<&str> = registry.fixtures().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Left", "Right"]);
        assert_eq!(registry.fixture(1).unwrap().name, "Right");
        assert_eq!(registry.fixture(1).unwrap().block(), 4..7);
        assert_eq!(registry.color("blue").unwrap(), Rgb::new(0, 0, 255));
    }

    #[test]
    fn rotation_keeps_palette_order_without_blackout() {
        let registry =
            FixtureRegistry::from_payload(payload(vec![rgb_fixture("Par", 1, 1)]), "off").unwrap();
        let rotation: Vec<&str> = registry.rotation().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(rotation, vec!["red", "blue", "green"]);
        assert_eq!(registry.blackout(), Some(Rgb::BLACK));
    }

    #[test]
    fn overlapping_blocks_conflict() {
        let err = FixtureRegistry::from_payload(
            payload(vec![rgb_fixture("Left", 1, 1), rgb_fixture("Right", 1, 3)]),
            "off",
        )
        .unwrap_err();
        assert!(matches!(err, ShowGenError::FixtureConflict(_)));
        assert!(format!("{err}").contains("Left"));
    }

    #[test]
    fn adjacent_blocks_and_other_universes_do_not_conflict() {
        let registry = FixtureRegistry::from_payload(
            payload(vec![
                rgb_fixture("A", 1, 1),
                rgb_fixture("B", 1, 4),
                rgb_fixture("C", 2, 1),
            ]),
            "off",
        )
        .unwrap();
        assert_eq!(registry.universes(), vec![1, 2]);
    }

    #[test]
    fn rejects_zero_based_addresses_and_oversized_blocks() {
        let err = FixtureRegistry::from_payload(payload(vec![rgb_fixture("A", 1, 0)]), "off")
            .unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidFixture(_)));

        let err = FixtureRegistry::from_payload(payload(vec![rgb_fixture("A", 1, 511)]), "off")
            .unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidFixture(_)));

        let mut fixture = rgb_fixture("A", 1, 512);
        fixture.channels = i64::MAX;
        let err = FixtureRegistry::from_payload(payload(vec![fixture]), "off").unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidFixture(_)));

        let mut fixture = rgb_fixture("A", 1, 1);
        fixture.channel_map.insert("intensity".to_string(), 3);
        let err = FixtureRegistry::from_payload(payload(vec![fixture]), "off").unwrap_err();
        assert!(format!("{err}").contains("intensity"));
    }

    #[test]
    fn rotation_must_reference_palette_colors() {
        let mut config = payload(vec![rgb_fixture("A", 1, 1)]);
        config.color_rotation = vec!["blue".to_string(), "magenta".to_string()];
        let err = FixtureRegistry::from_payload(config, "off").unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidPalette(_)));
        assert!(format!("{err}").contains("magenta"));
    }

    #[test]
    fn rejects_malformed_palettes() {
        let mut config = payload(vec![rgb_fixture("A", 1, 1)]);
        config.color_palette = palette(&[("off", [0, 0, 0])]);
        assert!(matches!(
            FixtureRegistry::from_payload(config, "off").unwrap_err(),
            ShowGenError::InvalidPalette(_)
        ));

        let mut config = payload(vec![rgb_fixture("A", 1, 1)]);
        config
            .color_palette
            .insert("hot".to_string(), serde_json::json!([300, 0, 0]));
        assert!(matches!(
            FixtureRegistry::from_payload(config, "off").unwrap_err(),
            ShowGenError::InvalidPalette(_)
        ));

        let err = FixtureRegistry::from_payload(payload(vec![rgb_fixture("A", 1, 1)]), "off")
            .unwrap()
            .color("teal")
            .unwrap_err();
        assert!(matches!(err, ShowGenError::InvalidPalette(_)));
    }
}
