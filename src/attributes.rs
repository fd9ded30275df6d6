//! Per input key/value string table.

use serde::{Deserialize, Serialize};

use crate::error::{BdfError, Result};

/// Longest key or value accepted, in bytes.
pub const MAX_ATTRIBUTE_LEN: usize = 4096;

/// Keys with defined meaning.
pub mod keys {
    /// Channel display name.
    pub const CHANNEL_NAME: &str = "ChName";
    /// Physical unit, `x*y` for a multiplied channel.
    pub const PHYSICAL_UNIT: &str = "ChPhysUnit";
    /// Unit before channel arithmetic was applied.
    pub const PHYSICAL_UNIT_EXT: &str = "ChPhysUnitExt";
}

/// Ordered attribute table of one input. Once sealed it rejects mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeStore {
    entries: Vec<(String, String)>,
    #[serde(skip)]
    sealed: bool,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an already sealed store, as read back from a file.
    pub fn sealed_from(entries: Vec<(String, String)>) -> Self {
        AttributeStore { entries, sealed: true }
    }

    /// Set `key` to `value`, replacing an earlier value of the same key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if self.sealed {
            return Err(BdfError::AttributesSealed(format!("key {:?}", key)));
        }
        if key.is_empty() {
            return Err(BdfError::InvalidArgument("attribute key must not be empty".into()));
        }
        if key.len() > MAX_ATTRIBUTE_LEN || value.len() > MAX_ATTRIBUTE_LEN {
            return Err(BdfError::InvalidArgument(format!(
                "attribute {:?} exceeds {} bytes",
                key, MAX_ATTRIBUTE_LEN
            )));
        }
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Mark this input as the product of two channels.
    ///
    /// The current physical unit moves to `ChPhysUnitExt` and `ChPhysUnit`
    /// becomes `x*y`.
    pub fn set_product_unit(&mut self, x_unit: &str, y_unit: &str) -> Result<()> {
        let original = self.get(keys::PHYSICAL_UNIT).unwrap_or_default().to_string();
        let product = format!("{}*{}", x_unit, y_unit);
        // check both before mutating
        if self.sealed {
            return Err(BdfError::AttributesSealed(format!("key {:?}", keys::PHYSICAL_UNIT)));
        }
        if product.len() > MAX_ATTRIBUTE_LEN {
            return Err(BdfError::InvalidArgument("product unit too long".into()));
        }
        self.set(keys::PHYSICAL_UNIT_EXT, &original)?;
        self.set(keys::PHYSICAL_UNIT, &product)
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}
