//! The serialized output artifact: fixtures, functions and the show.
//!
//! [`Workspace::to_xml`] renders the target application's workspace schema and
//! [`parse_workspace`] reads it back into the same model. Addresses are 1-based
//! everywhere in the model; the conversion to 0-based wire offsets lives in
//! [`writer`] and nowhere else.

mod reader;
mod writer;

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    Fixture, FixtureRegistry, Function, FunctionId, FunctionKind, FunctionSet, Result,
    ShowGenError, Show,
};

pub use reader::parse_workspace;
pub use writer::{config_address, wire_address};

pub const CREATOR_NAME: &str = "Q Light Controller Plus";
pub const CREATOR_VERSION: &str = "4.14.3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    pub version: String,
    pub author: String,
}

impl Creator {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            name: CREATOR_NAME.to_string(),
            version: CREATOR_VERSION.to_string(),
            author: author.into(),
        }
    }
}

/// Fixture as patched into the workspace. The semantic channel map stays in
/// the fixture configuration; the workspace only records the patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchedFixture {
    pub id: u32,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub mode: String,
    pub universe: u32,
    /// 1-based start channel.
    pub address: u32,
    pub channels: u32,
}

impl From<&Fixture> for PatchedFixture {
    fn from(fixture: &Fixture) -> Self {
        Self {
            id: fixture.id,
            name: fixture.name.clone(),
            manufacturer: fixture.manufacturer.clone(),
            model: fixture.model.clone(),
            mode: fixture.mode.clone(),
            universe: fixture.universe,
            address: fixture.address,
            channels: fixture.channel_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub creator: Creator,
    pub fixtures: Vec<PatchedFixture>,
    pub functions: Vec<Function>,
    /// Scene bound to the lights track and the blackout button.
    pub blackout: FunctionId,
    pub show: Show,
}

impl Workspace {
    /// Assembles the workspace from the outputs of the earlier stages.
    pub fn assemble(
        registry: &FixtureRegistry,
        set: FunctionSet,
        show: Show,
        author: impl Into<String>,
    ) -> Self {
        Self {
            creator: Creator::new(author),
            fixtures: registry.fixtures().iter().map(PatchedFixture::from).collect(),
            functions: set.functions,
            blackout: set.blackout,
            show,
        }
    }

    /// Reads a workspace file written by [`Workspace::write_to`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        parse_workspace(&text)
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.iter().find(|function| function.id == id)
    }

    /// Checks that every id is unique and every reference resolves.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        let all_ids = self
            .functions
            .iter()
            .map(|function| function.id)
            .chain([self.show.audio.id, self.show.id]);
        for id in all_ids {
            if !seen.insert(id) {
                return Err(inconsistent(format!("function id {id} is used twice")));
            }
        }

        let scene = |id: FunctionId| {
            matches!(
                self.function(id).map(|function| &function.kind),
                Some(FunctionKind::Scene { .. })
            )
        };

        if !scene(self.blackout) {
            return Err(inconsistent(format!(
                "blackout function {} is not a scene",
                self.blackout
            )));
        }

        for placement in &self.show.placements {
            if self.function(placement.function).is_none() {
                return Err(inconsistent(format!(
                    "show places function {} which does not exist",
                    placement.function
                )));
            }
        }

        let channels: BTreeMap<u32, u32> = self
            .fixtures
            .iter()
            .map(|fixture| (fixture.id, fixture.channels))
            .collect();
        if channels.len() != self.fixtures.len() {
            return Err(inconsistent("fixture ids are not unique"));
        }

        for function in &self.functions {
            if let Some(bound) = function.references() {
                if !scene(bound) {
                    return Err(inconsistent(format!(
                        "function {} is bound to {bound} which is not a scene",
                        function.id
                    )));
                }
            }

            let looks: Vec<&crate::Look> = match &function.kind {
                FunctionKind::Scene { look, .. } => vec![look],
                FunctionKind::Sequence { steps, .. } => steps.iter().map(|s| &s.look).collect(),
            };
            for look in looks {
                for (fixture, values) in look.iter() {
                    match channels.get(&fixture) {
                        Some(&count) if count as usize == values.len() => {}
                        Some(&count) => {
                            return Err(inconsistent(format!(
                                "function {} sets {} channels on fixture {fixture} which has {count}",
                                function.id,
                                values.len()
                            )));
                        }
                        None => {
                            return Err(inconsistent(format!(
                                "function {} references unknown fixture {fixture}",
                                function.id
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Renders the workspace as XML after checking referential completeness.
    pub fn to_xml(&self) -> Result<String> {
        self.validate()?;
        writer::render(self)
    }

    /// Writes the workspace to `path` through a temporary file in the same
    /// directory that is renamed into place only once fully flushed.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = self.to_xml()?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(xml.as_bytes())?;
        file.flush()?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;

        tracing::info!(path = %path.display(), bytes = xml.len(), "workspace written");
        Ok(())
    }
}

pub(crate) fn inconsistent(message: impl Into<String>) -> ShowGenError {
    ShowGenError::SerializationError(message.into())
}
