use crate::types::{ConfigError, ExternalRoleID, ProfileID, RoleID, UserID};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoleMapping {
    /// Named after the database column, holds the external role id.
    #[serde(rename = "discordRoleId")]
    pub external_role_id: ExternalRoleID,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProfileLink {
    #[serde(rename = "id")]
    pub profile_id: ProfileID,
    #[serde(rename = "discordUserId")]
    pub user_id: UserID,
}

/// Static mappings between platform ids and external database ids.
#[derive(Debug, Default)]
pub struct ReferenceLookup {
    roles: HashMap<RoleID, RoleMapping>,
    profiles: Vec<ProfileLink>,
}

impl ReferenceLookup {
    pub fn new(roles: HashMap<RoleID, RoleMapping>, profiles: Vec<ProfileLink>) -> Self {
        Self { roles, profiles }
    }

    pub fn load(role_map: &Path, profiles: &Path) -> Result<Self, ConfigError> {
        let roles: HashMap<RoleID, RoleMapping> = read_json(role_map)?;
        let profiles = if has_csv_extension(profiles) {
            read_csv(profiles)?
        } else {
            read_json(profiles)?
        };
        let lookup = Self::new(roles, profiles);
        log::info!(
            target: "lookup",
            "Loaded {} mapped roles and {} profiles.",
            lookup.roles.len(),
            lookup.profiles.len()
        );
        Ok(lookup)
    }

    pub fn profiles(&self) -> &[ProfileLink] {
        &self.profiles
    }

    /// Mapped roles among `role_ids`, in the order given.
    pub fn matching_roles<'a>(
        &'a self,
        role_ids: &'a [RoleID],
    ) -> impl Iterator<Item = (&'a RoleID, &'a RoleMapping)> + 'a {
        role_ids
            .iter()
            .filter_map(move |id| self.roles.get(id).map(|mapping| (id, mapping)))
    }
}

fn has_csv_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

fn reference_error(path: &Path, reason: impl ToString) -> ConfigError {
    ConfigError::ReferenceFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let file = std::fs::File::open(path).map_err(|e| reference_error(path, e))?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| reference_error(path, e))
}

fn read_csv(path: &Path) -> Result<Vec<ProfileLink>, ConfigError> {
    let file = std::fs::File::open(path).map_err(|e| reference_error(path, e))?;
    parse_profiles_csv(file).map_err(|e| reference_error(path, e))
}

fn parse_profiles_csv<R: std::io::Read>(input: R) -> Result<Vec<ProfileLink>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    reader.deserialize().collect()
}
