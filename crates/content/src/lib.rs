#![deny(warnings)]

//! Scenario content store: YAML boss-game scenarios keyed by module id.

use game_core::{validate_config, BossGameConfig, ModuleId, ValidationError};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Scenarios shipped with the binary.
const BUILTIN: &[(&str, &str)] = &[
    (
        "cash-flow-stress-test.yaml",
        include_str!("../../../assets/scenarios/cash-flow-stress-test.yaml"),
    ),
    (
        "raise-negotiation.yaml",
        include_str!("../../../assets/scenarios/raise-negotiation.yaml"),
    ),
];

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("io error: {0}")]
    Io(String),
    #[error("cannot parse {name}: {message}")]
    Parse { name: String, message: String },
    #[error("scenario {module} is invalid: {source}")]
    Invalid {
        module: String,
        #[source]
        source: ValidationError,
    },
    #[error("duplicate module id: {0}")]
    Duplicate(String),
}

impl From<std::io::Error> for ContentError {
    fn from(e: std::io::Error) -> Self {
        ContentError::Io(e.to_string())
    }
}

/// Parse and validate one scenario document. `name` is used in error messages.
///
/// Conditions are written as single-key maps (`{ has: tag }`, `all: [..]`)
/// rather than YAML `!tags`.
pub fn parse_scenario(name: &str, text: &str) -> Result<BossGameConfig, ContentError> {
    let de = serde_yaml::Deserializer::from_str(text);
    let config: BossGameConfig = serde_yaml::with::singleton_map_recursive::deserialize(de)
        .map_err(|e| ContentError::Parse {
            name: name.to_string(),
            message: e.to_string(),
        })?;
    validate_config(&config).map_err(|source| ContentError::Invalid {
        module: config.id.0.clone(),
        source,
    })?;
    Ok(config)
}

/// Validated scenarios keyed by module id.
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    scenarios: BTreeMap<ModuleId, BossGameConfig>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding the scenarios embedded at build time.
    pub fn builtin() -> Result<Self, ContentError> {
        let mut store = Self::new();
        for (name, text) in BUILTIN {
            store.insert(parse_scenario(name, text)?)?;
        }
        Ok(store)
    }

    /// Load every `*.yaml` / `*.yml` file directly under `root`.
    pub fn load_dir<P: AsRef<Path>>(root: P) -> Result<Self, ContentError> {
        let mut paths = Vec::new();
        for ent in fs::read_dir(root.as_ref())? {
            let ent = ent?;
            if !ent.file_type()?.is_file() {
                continue;
            }
            let path = ent.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("yaml") | Some("yml") => paths.push(path),
                _ => debug!(path = %path.display(), "skipping non-scenario file"),
            }
        }
        paths.sort();

        let mut store = Self::new();
        for path in paths {
            let text = fs::read_to_string(&path)?;
            let config = parse_scenario(&path.display().to_string(), &text)?;
            store.insert(config)?;
        }
        info!(root = %root.as_ref().display(), scenarios = store.len(), "content loaded");
        Ok(store)
    }

    /// Validate and add a scenario. Module ids must be unique.
    pub fn insert(&mut self, config: BossGameConfig) -> Result<(), ContentError> {
        validate_config(&config).map_err(|source| ContentError::Invalid {
            module: config.id.0.clone(),
            source,
        })?;
        if self.scenarios.contains_key(&config.id) {
            return Err(ContentError::Duplicate(config.id.0.clone()));
        }
        debug!(module = %config.id, months = config.months.len(), "scenario registered");
        self.scenarios.insert(config.id.clone(), config);
        Ok(())
    }

    pub fn get(&self, module: &str) -> Option<&BossGameConfig> {
        self.scenarios.get(&ModuleId::from(module))
    }

    pub fn module_ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.scenarios.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BossGameConfig> {
        self.scenarios.values()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
