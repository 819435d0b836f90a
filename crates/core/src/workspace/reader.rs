use std::str::FromStr;

use quick_xml::{events::Event, Reader};

use super::{
    inconsistent,
    writer::{config_address, AUDIO_TRACK, LIGHTS_TRACK},
    Creator, PatchedFixture, Workspace,
};
use crate::{
    AudioReference, Function, FunctionId, FunctionKind, Look, Placement, Result, SequenceStep,
    Show,
};

/// Minimal owned element tree built from the reader events.
#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, key: &str) -> Result<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| inconsistent(format!("<{}> is missing attribute `{key}`", self.name)))
    }

    fn parse_attr<T: FromStr>(&self, key: &str) -> Result<T> {
        let raw = self.attr(key)?;
        raw.parse().map_err(|_| {
            inconsistent(format!(
                "<{}> attribute `{key}` has invalid value `{raw}`",
                self.name
            ))
        })
    }

    fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn child(&self, name: &str) -> Result<&Element> {
        self.children
            .iter()
            .find(|child| child.name == name)
            .ok_or_else(|| inconsistent(format!("<{}> has no <{name}> element", self.name)))
    }

    fn child_text(&self, name: &str) -> Result<&str> {
        Ok(self.child(name)?.text.as_str())
    }

    fn parse_child<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.child_text(name)?;
        raw.parse().map_err(|_| {
            inconsistent(format!(
                "<{}> element <{name}> has invalid value `{raw}`",
                self.name
            ))
        })
    }
}

fn element_from(start: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
    let mut element = Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr?;
        element.attrs.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            attr.unescape_value()?.into_owned(),
        ));
    }
    Ok(element)
}

fn parse_tree(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref start) => stack.push(element_from(start)?),
            Event::Empty(ref start) => {
                let element = element_from(start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(ref text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(ref data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(data));
                }
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| inconsistent("unbalanced closing tag"))?;
                // Leaf text is kept verbatim; text around child elements is indentation.
                if !element.children.is_empty() {
                    element.text.clear();
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(inconsistent("document ended inside an element"));
    }
    root.ok_or_else(|| inconsistent("document has no root element"))
}

/// Parses a workspace document back into the model.
pub fn parse_workspace(xml: &str) -> Result<Workspace> {
    let root = parse_tree(xml)?;
    if root.name != "Workspace" {
        return Err(inconsistent(format!(
            "expected <Workspace> root, found <{}>",
            root.name
        )));
    }

    let creator = root.child("Creator")?;
    let creator = Creator {
        name: creator.child_text("Name")?.to_string(),
        version: creator.child_text("Version")?.to_string(),
        author: creator.child_text("Author")?.to_string(),
    };

    let engine = root.child("Engine")?;
    let fixtures = engine
        .children("Fixture")
        .map(parse_fixture)
        .collect::<Result<Vec<_>>>()?;

    let mut functions = Vec::new();
    let mut audio: Option<(FunctionId, String, String)> = None;
    let mut show_element: Option<&Element> = None;

    for element in engine.children("Function") {
        let id: FunctionId = element.parse_attr("ID")?;
        let name = element.attr("Name")?.to_string();
        match element.attr("Type")? {
            "Scene" => functions.push(Function {
                id,
                name,
                kind: parse_scene(element)?,
            }),
            "Sequence" => functions.push(Function {
                id,
                name,
                kind: parse_sequence(element)?,
            }),
            "Audio" => {
                let path = element.child_text("Source")?.to_string();
                audio = Some((id, name, path));
            }
            "Show" => show_element = Some(element),
            other => {
                return Err(inconsistent(format!(
                    "function {id} has unsupported type `{other}`"
                )))
            }
        }
    }

    let show_element = show_element.ok_or_else(|| inconsistent("workspace has no show"))?;
    let (audio_id, audio_name, audio_path) =
        audio.ok_or_else(|| inconsistent("workspace has no audio function"))?;
    let (show, blackout) = parse_show(show_element, audio_id, audio_name, audio_path)?;

    let workspace = Workspace {
        creator,
        fixtures,
        functions,
        blackout,
        show,
    };
    workspace.validate()?;
    Ok(workspace)
}

fn parse_fixture(element: &Element) -> Result<PatchedFixture> {
    Ok(PatchedFixture {
        id: element.parse_child("ID")?,
        name: element.child_text("Name")?.to_string(),
        manufacturer: element.child_text("Manufacturer")?.to_string(),
        model: element.child_text("Model")?.to_string(),
        mode: element.child_text("Mode")?.to_string(),
        universe: element.parse_child("Universe")?,
        address: config_address(element.parse_child("Address")?),
        channels: element.parse_child("Channels")?,
    })
}

/// Parses `channel,value,channel,value…` into a dense channel vector.
fn parse_channel_pairs(text: &str) -> Result<Vec<u8>> {
    let numbers = text
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| inconsistent(format!("invalid channel value `{part}`")))
        })
        .collect::<Result<Vec<_>>>()?;

    if numbers.len() % 2 != 0 {
        return Err(inconsistent(format!(
            "channel values `{text}` are not channel/value pairs"
        )));
    }

    let pairs: Vec<(usize, u8)> = numbers
        .chunks(2)
        .map(|pair| {
            let value = u8::try_from(pair[1])
                .map_err(|_| inconsistent(format!("channel value {} exceeds 255", pair[1])))?;
            Ok((pair[0] as usize, value))
        })
        .collect::<Result<_>>()?;

    let len = pairs.iter().map(|(channel, _)| channel + 1).max().unwrap_or(0);
    let mut values = vec![0u8; len];
    for (channel, value) in pairs {
        values[channel] = value;
    }
    Ok(values)
}

fn parse_scene(element: &Element) -> Result<FunctionKind> {
    let speed = element.child("Speed")?;
    let mut look = Look::new();
    for value in element.children("FixtureVal") {
        look.insert(value.parse_attr("ID")?, parse_channel_pairs(&value.text)?);
    }
    Ok(FunctionKind::Scene {
        look,
        fade_in_ms: speed.parse_attr("FadeIn")?,
        fade_out_ms: speed.parse_attr("FadeOut")?,
    })
}

fn parse_step_values(text: &str) -> Result<Look> {
    let mut look = Look::new();
    let mut parts = text.split(':');
    while let Some(fixture) = parts.next() {
        if fixture.trim().is_empty() {
            continue;
        }
        let fixture: u32 = fixture
            .trim()
            .parse()
            .map_err(|_| inconsistent(format!("invalid fixture id `{fixture}` in step")))?;
        let values = parts
            .next()
            .ok_or_else(|| inconsistent(format!("step has no values for fixture {fixture}")))?;
        look.insert(fixture, parse_channel_pairs(values)?);
    }
    Ok(look)
}

fn parse_sequence(element: &Element) -> Result<FunctionKind> {
    let steps = element
        .children("Step")
        .map(|step| {
            let fade_in_ms: u32 = step.parse_attr("FadeIn")?;
            let hold: u32 = step.parse_attr("Hold")?;
            Ok(SequenceStep {
                look: parse_step_values(&step.text)?,
                duration_ms: fade_in_ms + hold,
                fade_in_ms,
                fade_out_ms: step.parse_attr("FadeOut")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FunctionKind::Sequence {
        bound_scene: element.parse_attr("BoundScene")?,
        steps,
    })
}

fn parse_show(
    element: &Element,
    audio_id: FunctionId,
    audio_name: String,
    audio_path: String,
) -> Result<(Show, FunctionId)> {
    let track = |name: &str| {
        element
            .children("Track")
            .find(|track| track.attr("Name").map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| inconsistent(format!("show has no `{name}` track")))
    };

    let audio_track = track(AUDIO_TRACK)?;
    let audio_entry = audio_track
        .children("ShowFunction")
        .find(|entry| entry.parse_attr::<FunctionId>("ID").ok() == Some(audio_id))
        .ok_or_else(|| inconsistent("audio track does not place the audio function"))?;

    let audio = AudioReference {
        id: audio_id,
        name: audio_name,
        path: audio_path,
        start_ms: audio_entry.parse_attr("StartTime")?,
        duration_ms: audio_entry.parse_attr("Duration")?,
    };

    let lights = track(LIGHTS_TRACK)?;
    let blackout: FunctionId = lights.parse_attr("SceneID")?;
    let placements = lights
        .children("ShowFunction")
        .map(|entry| {
            Ok(Placement {
                function: entry.parse_attr("ID")?,
                start_ms: entry.parse_attr("StartTime")?,
                duration_ms: entry.parse_attr("Duration")?,
                fade_in_ms: entry.parse_attr("FadeIn")?,
                fade_out_ms: entry.parse_attr("FadeOut")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let show = Show {
        id: element.parse_attr("ID")?,
        name: element.attr("Name")?.to_string(),
        bpm: element.child("TimeDivision")?.parse_attr("BPM")?,
        audio,
        placements,
    };
    Ok((show, blackout))
}
