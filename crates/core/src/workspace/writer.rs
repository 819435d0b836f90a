use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

use super::{inconsistent, Workspace};
use crate::{Function, FunctionKind, Look, Result};

pub(super) const WORKSPACE_NAMESPACE: &str = "http://www.qlcplus.org/Workspace";
/// Scene id the target application uses for "no bound scene".
pub(super) const NO_SCENE: &str = "4294967295";
pub(super) const AUDIO_TRACK: &str = "Audio";
pub(super) const LIGHTS_TRACK: &str = "Lights";

/// Converts a 1-based configuration address into the 0-based wire offset.
pub fn wire_address(address: u32) -> Result<u32> {
    address
        .checked_sub(1)
        .ok_or_else(|| inconsistent("fixture address 0 has no wire offset; addresses are 1-based"))
}

/// Converts a 0-based wire offset back into the 1-based configuration address.
pub fn config_address(offset: u32) -> u32 {
    offset + 1
}

type Attrs<'a> = &'a [(&'a str, String)];

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 1),
        }
    }

    fn start(name: &str, attrs: Attrs<'_>) -> BytesStart<'static> {
        let mut element = BytesStart::new(name.to_string());
        for (key, value) in attrs {
            element.push_attribute((*key, value.as_str()));
        }
        element
    }

    fn open(&mut self, name: &str, attrs: Attrs<'_>) -> Result<()> {
        self.writer.write_event(Event::Start(Self::start(name, attrs)))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: Attrs<'_>) -> Result<()> {
        self.writer.write_event(Event::Empty(Self::start(name, attrs)))?;
        Ok(())
    }

    fn text(&mut self, name: &str, attrs: Attrs<'_>, text: &str) -> Result<()> {
        self.open(name, attrs)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn finish(self) -> Result<String> {
        let bytes = self.writer.into_inner();
        String::from_utf8(bytes).map_err(|err| inconsistent(err.to_string()))
    }
}

/// Renders the workspace in canonical element order.
pub(super) fn render(workspace: &Workspace) -> Result<String> {
    let mut out = XmlOut::new();
    out.writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    out.writer
        .write_event(Event::DocType(BytesText::from_escaped("Workspace")))?;

    out.open(
        "Workspace",
        &[
            ("xmlns", WORKSPACE_NAMESPACE.to_string()),
            ("CurrentWindow", "VirtualConsole".to_string()),
        ],
    )?;

    out.open("Creator", &[])?;
    out.text("Name", &[], &workspace.creator.name)?;
    out.text("Version", &[], &workspace.creator.version)?;
    out.text("Author", &[], &workspace.creator.author)?;
    out.close("Creator")?;

    out.open("Engine", &[])?;
    write_universes(&mut out, workspace)?;
    write_fixtures(&mut out, workspace)?;
    for function in &workspace.functions {
        write_function(&mut out, function)?;
    }
    write_audio(&mut out, workspace)?;
    write_show(&mut out, workspace)?;
    out.close("Engine")?;

    write_virtual_console(&mut out, workspace)?;

    out.close("Workspace")?;

    let mut xml = out.finish()?;
    xml.push('\n');
    Ok(xml)
}

fn write_universes(out: &mut XmlOut, workspace: &Workspace) -> Result<()> {
    let mut universes: Vec<u32> = workspace.fixtures.iter().map(|f| f.universe).collect();
    universes.sort_unstable();
    universes.dedup();

    out.open("InputOutputMap", &[])?;
    for universe in universes {
        out.empty(
            "Universe",
            &[
                ("Name", format!("Universe {universe}")),
                ("ID", universe.to_string()),
            ],
        )?;
    }
    out.close("InputOutputMap")
}

fn write_fixtures(out: &mut XmlOut, workspace: &Workspace) -> Result<()> {
    for fixture in &workspace.fixtures {
        out.open("Fixture", &[])?;
        out.text("Manufacturer", &[], &fixture.manufacturer)?;
        out.text("Model", &[], &fixture.model)?;
        out.text("Mode", &[], &fixture.mode)?;
        out.text("ID", &[], &fixture.id.to_string())?;
        out.text("Name", &[], &fixture.name)?;
        out.text("Universe", &[], &fixture.universe.to_string())?;
        out.text("Address", &[], &wire_address(fixture.address)?.to_string())?;
        out.text("Channels", &[], &fixture.channels.to_string())?;
        out.close("Fixture")?;
    }
    Ok(())
}

fn speed(fade_in: u32, fade_out: u32, duration: u32) -> [(&'static str, String); 3] {
    [
        ("FadeIn", fade_in.to_string()),
        ("FadeOut", fade_out.to_string()),
        ("Duration", duration.to_string()),
    ]
}

fn write_function(out: &mut XmlOut, function: &Function) -> Result<()> {
    match &function.kind {
        FunctionKind::Scene {
            look,
            fade_in_ms,
            fade_out_ms,
        } => {
            out.open(
                "Function",
                &[
                    ("ID", function.id.to_string()),
                    ("Type", "Scene".to_string()),
                    ("Name", function.name.clone()),
                ],
            )?;
            out.empty("Speed", &speed(*fade_in_ms, *fade_out_ms, 0))?;
            for (fixture, values) in look.iter() {
                out.text(
                    "FixtureVal",
                    &[("ID", fixture.to_string())],
                    &channel_pairs(values),
                )?;
            }
        }
        FunctionKind::Sequence { bound_scene, steps } => {
            out.open(
                "Function",
                &[
                    ("ID", function.id.to_string()),
                    ("Type", "Sequence".to_string()),
                    ("Name", function.name.clone()),
                    ("BoundScene", bound_scene.to_string()),
                ],
            )?;
            out.empty("Speed", &speed(0, 0, 0))?;
            out.text("Direction", &[], "Forward")?;
            out.text("RunOrder", &[], "SingleShot")?;
            out.empty(
                "SpeedModes",
                &[
                    ("FadeIn", "PerStep".to_string()),
                    ("FadeOut", "PerStep".to_string()),
                    ("Duration", "PerStep".to_string()),
                ],
            )?;
            for (number, step) in steps.iter().enumerate() {
                let hold = step.duration_ms.saturating_sub(step.fade_in_ms);
                out.text(
                    "Step",
                    &[
                        ("Number", number.to_string()),
                        ("FadeIn", step.fade_in_ms.to_string()),
                        ("Hold", hold.to_string()),
                        ("FadeOut", step.fade_out_ms.to_string()),
                        ("Values", value_count(&step.look).to_string()),
                    ],
                    &step_values(&step.look),
                )?;
            }
        }
    }
    out.close("Function")
}

/// `channel,value` pairs for every channel of one fixture.
fn channel_pairs(values: &[u8]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(channel, value)| format!("{channel},{value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// `fixture:channel,value,…` blocks joined by `:`.
fn step_values(look: &Look) -> String {
    look.iter()
        .map(|(fixture, values)| format!("{fixture}:{}", channel_pairs(values)))
        .collect::<Vec<_>>()
        .join(":")
}

fn value_count(look: &Look) -> usize {
    look.iter().map(|(_, values)| values.len()).sum()
}

fn write_audio(out: &mut XmlOut, workspace: &Workspace) -> Result<()> {
    let audio = &workspace.show.audio;
    out.open(
        "Function",
        &[
            ("ID", audio.id.to_string()),
            ("Type", "Audio".to_string()),
            ("Name", audio.name.clone()),
        ],
    )?;
    out.empty("Speed", &speed(0, 0, 0))?;
    out.text("Source", &[], &audio.path)?;
    out.close("Function")
}

fn write_show(out: &mut XmlOut, workspace: &Workspace) -> Result<()> {
    let show = &workspace.show;
    out.open(
        "Function",
        &[
            ("ID", show.id.to_string()),
            ("Type", "Show".to_string()),
            ("Name", show.name.clone()),
        ],
    )?;
    out.empty(
        "TimeDivision",
        &[
            ("Type", "BPM_4_4".to_string()),
            ("BPM", show.bpm.to_string()),
        ],
    )?;

    out.open(
        "Track",
        &[
            ("ID", "0".to_string()),
            ("Name", AUDIO_TRACK.to_string()),
            ("SceneID", NO_SCENE.to_string()),
            ("isMute", "0".to_string()),
        ],
    )?;
    out.empty(
        "ShowFunction",
        &[
            ("ID", show.audio.id.to_string()),
            ("StartTime", show.audio.start_ms.to_string()),
            ("Duration", show.audio.duration_ms.to_string()),
        ],
    )?;
    out.close("Track")?;

    out.open(
        "Track",
        &[
            ("ID", "1".to_string()),
            ("Name", LIGHTS_TRACK.to_string()),
            ("SceneID", workspace.blackout.to_string()),
            ("isMute", "0".to_string()),
        ],
    )?;
    for placement in &show.placements {
        out.empty(
            "ShowFunction",
            &[
                ("ID", placement.function.to_string()),
                ("StartTime", placement.start_ms.to_string()),
                ("Duration", placement.duration_ms.to_string()),
                ("FadeIn", placement.fade_in_ms.to_string()),
                ("FadeOut", placement.fade_out_ms.to_string()),
            ],
        )?;
    }
    out.close("Track")?;

    out.close("Function")
}

fn appearance(out: &mut XmlOut, foreground: &str, background: &str) -> Result<()> {
    out.open("Appearance", &[])?;
    out.text("FrameStyle", &[], "None")?;
    out.text("ForegroundColor", &[], foreground)?;
    out.text("BackgroundColor", &[], background)?;
    out.text("BackgroundImage", &[], "None")?;
    out.text("Font", &[], "Default")?;
    out.close("Appearance")
}

fn window(x: u32, y: u32, width: u32, height: u32) -> [(&'static str, String); 5] {
    [
        ("Visible", "False".to_string()),
        ("X", x.to_string()),
        ("Y", y.to_string()),
        ("Width", width.to_string()),
        ("Height", height.to_string()),
    ]
}

fn button(
    out: &mut XmlOut,
    caption: &str,
    function: u32,
    position: [u32; 4],
    background: &str,
) -> Result<()> {
    out.open(
        "Button",
        &[("Icon", String::new()), ("Caption", caption.to_string())],
    )?;
    out.empty("Function", &[("ID", function.to_string())])?;
    out.text("Action", &[], "Toggle")?;
    out.text("Intensity", &[("Adjust", "False".to_string())], "100")?;
    let [x, y, width, height] = position;
    out.empty("WindowState", &window(x, y, width, height))?;
    appearance(out, "4294967295", background)?;
    out.close("Button")
}

fn write_virtual_console(out: &mut XmlOut, workspace: &Workspace) -> Result<()> {
    out.open("VirtualConsole", &[])?;
    out.open("Frame", &[("Caption", String::new())])?;
    appearance(out, "Default", "Default")?;
    out.empty("WindowState", &window(0, 0, 1920, 1080))?;
    for (flag, value) in [
        ("AllowChildren", "True"),
        ("AllowResize", "True"),
        ("ShowHeader", "False"),
        ("ShowEnableButton", "True"),
        ("Collapsed", "False"),
        ("Disabled", "False"),
    ] {
        out.text(flag, &[], value)?;
    }

    button(out, "GO", workspace.show.id, [10, 10, 150, 150], "4278233600")?;
    button(
        out,
        "BLACKOUT",
        workspace.blackout,
        [10, 180, 150, 80],
        "4278190080",
    )?;

    out.open(
        "Slider",
        &[
            ("Caption", "Master".to_string()),
            ("WidgetStyle", "Slider".to_string()),
            ("InvertedAppearance", "false".to_string()),
        ],
    )?;
    out.empty("WindowState", &window(200, 10, 60, 200))?;
    appearance(out, "Default", "Default")?;
    out.text(
        "SliderMode",
        &[
            ("ValueDisplayStyle", "Percentage".to_string()),
            ("Monitor", "false".to_string()),
        ],
        "Level",
    )?;
    out.open(
        "Level",
        &[
            ("LowLimit", "0".to_string()),
            ("HighLimit", "255".to_string()),
            ("Value", "255".to_string()),
        ],
    )?;
    for fixture in &workspace.fixtures {
        for channel in 0..fixture.channels {
            out.text(
                "Channel",
                &[("Fixture", fixture.id.to_string())],
                &channel.to_string(),
            )?;
        }
    }
    out.close("Level")?;
    out.close("Slider")?;
    out.close("Frame")?;

    out.open("Properties", &[])?;
    out.empty(
        "Size",
        &[("Width", "1920".to_string()), ("Height", "1080".to_string())],
    )?;
    out.empty(
        "GrandMaster",
        &[
            ("ChannelMode", "Intensity".to_string()),
            ("ValueMode", "Reduce".to_string()),
            ("SliderMode", "Normal".to_string()),
        ],
    )?;
    out.close("Properties")?;
    out.close("VirtualConsole")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{workspace::tests::sample_workspace, Style};

    #[test]
    fn addresses_shift_by_exactly_one() {
        assert_eq!(wire_address(1).unwrap(), 0);
        assert_eq!(wire_address(512).unwrap(), 511);
        assert_eq!(config_address(0), 1);
        assert_eq!(config_address(wire_address(37).unwrap()), 37);
        assert!(wire_address(0).is_err());
    }

    #[test]
    fn fixtures_use_zero_based_addresses_and_declared_universes() {
        let xml = sample_workspace(Style::Moderate).to_xml().unwrap();
        assert!(xml.contains("<Address>0</Address>"));
        assert!(xml.contains("<Address>3</Address>"));
        assert!(xml.contains("<Address>4</Address>"));
        assert!(!xml.contains("<Address>1</Address>"));
        assert!(xml.contains("<Universe>2</Universe>"));
        assert!(xml.contains(r#"<Universe Name="Universe 1" ID="1"/>"#));
    }

    #[test]
    fn header_and_escaping() {
        let xml = sample_workspace(Style::Calm).to_xml().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<!DOCTYPE Workspace>"));
        assert!(xml.contains("<Name>Q Light Controller Plus</Name>"));
        assert!(xml.contains("<Name>Par &lt;L&gt;</Name>"));
        assert!(xml.contains("<Source>audio/song &amp; friends.wav</Source>"));
    }

    #[test]
    fn scenes_list_every_channel() {
        let xml = sample_workspace(Style::Calm).to_xml().unwrap();
        assert!(xml.contains(r#"<FixtureVal ID="2">0,0,1,0,2,0,3,0,4,0</FixtureVal>"#));
    }

    #[test]
    fn step_values_join_fixtures() {
        let mut look = Look::new();
        look.insert(0, vec![255, 0, 0]);
        look.insert(3, vec![0, 128]);
        assert_eq!(step_values(&look), "0:0,255,1,0,2,0:3:0,0,1,128");
        assert_eq!(value_count(&look), 5);
    }
}
