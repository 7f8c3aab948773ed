//! Migration profile loading and validation.

mod types;
mod validation;

pub use types::{MigrationOptions, Profile};

use crate::error::Result;
use std::path::Path;

impl Profile {
    /// Load a profile from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a profile from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let profile: Profile = serde_yaml::from_str(yaml)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Validate the profile.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
