use crate::types::{RoleID, UserID};
use serde::{Deserialize, Serialize};

/// User object as returned inside a guild member payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiUser {
    pub id: UserID,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

/// Guild member payload, only the fields the exports use.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiMember {
    pub user: ApiUser,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub roles: Vec<RoleID>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiRole {
    pub id: RoleID,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiGuild {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRecord {
    pub user_id: UserID,
    pub is_bot: bool,
    pub nickname: Option<String>,
    pub global_name: Option<String>,
    pub username: String,
    pub discriminator: String,
    pub pending: bool,
    pub role_ids: Vec<RoleID>,
}

impl MembershipRecord {
    /// Users moved to the unique-username scheme report discriminator "0".
    pub fn has_migrated_username(&self) -> bool {
        self.discriminator == "0"
    }

    pub fn has_role(&self, role_id: &str) -> bool {
        self.role_ids.iter().any(|id| id == role_id)
    }
}

impl From<ApiMember> for MembershipRecord {
    fn from(member: ApiMember) -> Self {
        MembershipRecord {
            user_id: member.user.id,
            is_bot: member.user.bot,
            nickname: member.nick,
            global_name: member.user.global_name,
            username: member.user.username,
            discriminator: member.user.discriminator,
            pending: member.pending,
            role_ids: member.roles,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::member::{ApiMember, MembershipRecord};

    #[test]
    fn test_from_api_member() {
        let member: ApiMember = serde_json::from_str(
            r#"{
                "user": {"id": "80351110224678912", "username": "nelly", "discriminator": "1337", "global_name": null},
                "nick": "NOT API SUPPORT",
                "roles": ["41771983423143936", "41771983423143937"],
                "joined_at": "2015-04-26T06:26:56.936000+00:00",
                "deaf": false,
                "mute": false
            }"#,
        )
        .unwrap();
        let record = MembershipRecord::from(member);
        assert_eq!(record.user_id, "80351110224678912");
        assert!(!record.is_bot);
        assert!(!record.pending);
        assert_eq!(record.nickname.as_deref(), Some("NOT API SUPPORT"));
        assert_eq!(record.global_name, None);
        assert_eq!(record.role_ids.len(), 2);
        assert!(!record.has_migrated_username());
    }

    #[test]
    fn test_migrated_username() {
        let member: ApiMember = serde_json::from_str(
            r#"{"user": {"id": "1", "username": "joe", "discriminator": "0", "global_name": "Joe", "bot": true}, "pending": true}"#,
        )
        .unwrap();
        let record = MembershipRecord::from(member);
        assert!(record.has_migrated_username());
        assert!(record.is_bot);
        assert!(record.pending);
        assert_eq!(record.global_name.as_deref(), Some("Joe"));
        assert!(record.role_ids.is_empty());
    }

    #[test]
    fn test_has_role_is_exact() {
        let mut record = MembershipRecord::from(ApiMember {
            user: crate::member::ApiUser {
                id: "1".to_string(),
                username: "joe".to_string(),
                discriminator: "0".to_string(),
                global_name: None,
                bot: false,
            },
            nick: None,
            pending: false,
            roles: vec!["1234".to_string()],
        });
        assert!(record.has_role("1234"));
        assert!(!record.has_role("123"));
        assert!(!record.has_role("12345"));
        record.role_ids.clear();
        assert!(!record.has_role("1234"));
    }
}
