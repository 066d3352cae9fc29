//! Tool shed domain types

use serde::{Deserialize, Deserializer, Serialize};

/// Identifies an installed repository revision on a tool shed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    pub owner: String,
    pub changeset_revision: String,
}

/// Update status of an installed repository as reported by its tool shed
///
/// Tool sheds encode the flags as the strings `"True"` / `"False"`; plain
/// JSON booleans are accepted too. Missing flags default to `false`, which
/// is also the value substituted when the tool shed cannot be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    #[serde(default, deserialize_with = "flag")]
    pub latest_installable_revision: bool,

    #[serde(default, deserialize_with = "flag")]
    pub revision_update: bool,

    #[serde(default, deserialize_with = "flag")]
    pub revision_upgrade: bool,

    #[serde(default, deserialize_with = "flag")]
    pub repository_deprecated: bool,
}

impl RepositoryStatus {
    /// Whether anything newer than the installed revision is available
    pub fn has_update(&self) -> bool {
        self.revision_update || self.revision_upgrade
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
    })
}
