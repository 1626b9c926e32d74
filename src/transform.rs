use crate::lookup::ReferenceLookup;
use crate::member::MembershipRecord;
use crate::types::{ExternalRoleID, ProfileID};

pub const CSV_HEADER: &str = "userId,userIsBot,hasMigratedUsername,guildMemberNickname,userGlobalName,userUsername,userDiscriminator,pendingGuildMember,guildMemberRoles";

pub const SQL_HEADER: &str = "\
-- Links profiles to their Discord roles in \"public\".\"_DiscordRoleToProfile\".
--   \"A\": external role id (DiscordRole.id)
--   \"B\": external profile id (Profile.id)
-- Existing links are left untouched (ON CONFLICT DO NOTHING).
";

/// Quotes a field that would otherwise break the row apart.
fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One CSV line, without the trailing newline.
pub fn csv_row(record: &MembershipRecord) -> String {
    let roles = format!("\"{}\"", record.role_ids.join(",").replace('"', "\"\""));
    [
        escape_field(&record.user_id),
        record.is_bot.to_string(),
        record.has_migrated_username().to_string(),
        escape_field(record.nickname.as_deref().unwrap_or_default()),
        escape_field(record.global_name.as_deref().unwrap_or_default()),
        escape_field(&record.username),
        escape_field(&record.discriminator),
        record.pending.to_string(),
        roles,
    ]
    .join(",")
}

pub fn upsert_statement(external_role_id: ExternalRoleID, profile_id: ProfileID) -> String {
    format!(
        "INSERT INTO \"public\".\"_DiscordRoleToProfile\" (\"A\", \"B\") VALUES ({external_role_id}, {profile_id}) ON CONFLICT (\"A\", \"B\") DO NOTHING;"
    )
}

/// Upserts for every role of `record` known to `lookup`.
///
/// Returns `None` when none of the roles are mapped.
pub fn sql_block(
    record: &MembershipRecord,
    profile_id: ProfileID,
    lookup: &ReferenceLookup,
) -> Option<String> {
    let statements: Vec<String> = lookup
        .matching_roles(&record.role_ids)
        .map(|(role_id, mapping)| {
            log::debug!(target: "transform", "{} has role {role_id} ({}).", record.username, mapping.name);
            upsert_statement(mapping.external_role_id, profile_id)
        })
        .collect();
    if statements.is_empty() {
        return None;
    }
    // Usernames are free text, keep them on the comment line.
    let username = record.username.replace(['\n', '\r'], " ");
    Some(format!(
        "-- Set Profile Discord roles for {username}\n{}\n",
        statements.join("\n")
    ))
}
