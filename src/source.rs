use crate::member::{ApiGuild, ApiMember, ApiRole, MembershipRecord};
use crate::types::{ConfigError, SourceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

/// Where guild, role and member data comes from.
#[async_trait]
pub trait GuildSource: Send + Sync {
    async fn guild(&self, guild_id: &str) -> Result<ApiGuild, SourceError>;
    async fn role(&self, guild_id: &str, role_id: &str) -> Result<ApiRole, SourceError>;
    /// Every member of the guild, in the order the source returns them.
    async fn members(&self, guild_id: &str) -> Result<Vec<MembershipRecord>, SourceError>;
    async fn member(&self, guild_id: &str, user_id: &str)
        -> Result<MembershipRecord, SourceError>;
    /// Called once, after every artifact has been written.
    async fn close(&self) {}
}

/// A guild dump kept in memory.
///
/// Loaded from a JSON file for offline exports.
#[derive(Deserialize, Debug)]
pub struct SnapshotSource {
    guild: ApiGuild,
    #[serde(default)]
    roles: Vec<ApiRole>,
    #[serde(default)]
    members: Vec<ApiMember>,
}

impl SnapshotSource {
    #[cfg(test)]
    pub fn new(guild: ApiGuild, roles: Vec<ApiRole>, members: Vec<ApiMember>) -> Self {
        Self {
            guild,
            roles,
            members,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let reference_error = |reason: String| ConfigError::ReferenceFile {
            path: path.display().to_string(),
            reason,
        };
        let file = std::fs::File::open(path).map_err(|e| reference_error(e.to_string()))?;
        let snapshot: SnapshotSource = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| reference_error(e.to_string()))?;
        log::info!(
            target: "source",
            "Loaded snapshot of guild {} with {} roles and {} members.",
            snapshot.guild.id,
            snapshot.roles.len(),
            snapshot.members.len()
        );
        Ok(snapshot)
    }

    fn check_guild(&self, guild_id: &str) -> Result<(), SourceError> {
        if self.guild.id == guild_id {
            Ok(())
        } else {
            Err(SourceError::NotFound(format!("guild {guild_id}")))
        }
    }
}

#[async_trait]
impl GuildSource for SnapshotSource {
    async fn guild(&self, guild_id: &str) -> Result<ApiGuild, SourceError> {
        self.check_guild(guild_id)?;
        Ok(self.guild.clone())
    }

    async fn role(&self, guild_id: &str, role_id: &str) -> Result<ApiRole, SourceError> {
        self.check_guild(guild_id)?;
        self.roles
            .iter()
            .find(|role| role.id == role_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("role {role_id}")))
    }

    async fn members(&self, guild_id: &str) -> Result<Vec<MembershipRecord>, SourceError> {
        self.check_guild(guild_id)?;
        Ok(self
            .members
            .iter()
            .cloned()
            .map(MembershipRecord::from)
            .collect())
    }

    async fn member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<MembershipRecord, SourceError> {
        self.check_guild(guild_id)?;
        self.members
            .iter()
            .find(|member| member.user.id == user_id)
            .cloned()
            .map(MembershipRecord::from)
            .ok_or_else(|| SourceError::NotFound(format!("member {user_id}")))
    }
}
