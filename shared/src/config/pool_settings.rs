use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    archetype::{Archetype, MAX_ARCHETYPE_NAME_BYTES},
    config::PoolPolicy,
    error::ConfigError,
};

/// Upper bound on pools per session, so a slot's pool tag fits on the wire.
pub const MAX_ARCHETYPES: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeSettings {
    pub name: Archetype,
    #[serde(flatten)]
    pub policy: PoolPolicy,
}

impl ArchetypeSettings {
    pub fn new(name: impl Into<String>, policy: PoolPolicy) -> Self {
        Self {
            name: Archetype::new(name),
            policy,
        }
    }
}

/// Session-level pool configuration.
///
/// ```toml
/// automatic_reset = true
///
/// [[archetypes]]
/// name = "ProjectileA"
/// initial_size = 10
/// max_size = 10
/// ```
///
/// Archetypes register in file order; server and client must load the same
/// list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Run each archetype's `restore_defaults` before a slot re-enters the
    /// free list
    pub automatic_reset: bool,
    pub archetypes: Vec<ArchetypeSettings>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            automatic_reset: true,
            archetypes: Vec::new(),
        }
    }
}

impl PoolSettings {
    pub fn with_archetype(mut self, name: impl Into<String>, policy: PoolPolicy) -> Self {
        self.archetypes.push(ArchetypeSettings::new(name, policy));
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.archetypes.len() > MAX_ARCHETYPES {
            return Err(ConfigError::TooManyArchetypes {
                max: MAX_ARCHETYPES,
            });
        }
        let mut seen = HashSet::new();
        for entry in &self.archetypes {
            validate_name(&entry.name)?;
            if !seen.insert(entry.name.name()) {
                return Err(ConfigError::DuplicateArchetype {
                    archetype: entry.name.to_string(),
                });
            }
            entry.policy.validate(entry.name.name())?;
        }
        Ok(())
    }
}

pub(crate) fn validate_name(archetype: &Archetype) -> Result<(), ConfigError> {
    if archetype.name().is_empty() {
        return Err(ConfigError::EmptyArchetypeName);
    }
    if archetype.name().len() > MAX_ARCHETYPE_NAME_BYTES {
        return Err(ConfigError::ArchetypeNameTooLong {
            archetype: archetype.to_string(),
            max: MAX_ARCHETYPE_NAME_BYTES,
        });
    }
    Ok(())
}
