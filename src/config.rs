use crate::output::Destination;
use crate::types::{ConfigError, GuildID, RoleID};
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Exports Discord guild members and roles as CSV files or SQL upserts.")]
pub struct Cli {
    /// Guild (server) to export from.
    #[arg(long, env = "DISCORD_GUILD_ID")]
    pub guild_id: String,

    /// Bot token. Not needed with --snapshot.
    #[arg(long, env = "DISCORD_APP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Print artifacts to stdout instead of writing files. Any value other
    /// than an empty one, `false`, `no`, `off`, `n`, `f` or `0` turns it on.
    #[arg(
        long,
        env = "DEBUG",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true",
        value_parser = FalseyValueParser::new()
    )]
    pub debug: bool,

    #[arg(long, env = "EXPORT_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Per request timeout against the API.
    #[arg(long, env = "DISCORD_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, env = "DISCORD_API_BASE", default_value = "https://discord.com/api/v10")]
    pub api_base: String,

    /// Read guild data from a JSON dump instead of the API.
    #[arg(long, env = "DISCORD_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// One CSV file per role listing the members that hold it.
    Members {
        /// Comma separated role ids.
        #[arg(long, env = "DISCORD_ROLES", value_delimiter = ',', required = true)]
        roles: Vec<String>,
    },
    /// One SQL file linking known profiles to their mapped roles.
    RoleLinks {
        #[arg(long, env = "DISCORD_ROLE_MAP", default_value = "jsons/discord_role_ids.json")]
        role_map: PathBuf,

        /// JSON list of {id, discordUserId}, or CSV with the same columns.
        #[arg(
            long,
            env = "DISCORD_PROFILES",
            default_value = "jsons/profile_ids-server_member_ids.json"
        )]
        profiles: PathBuf,

        /// Member lookups in flight at once.
        #[arg(long, env = "EXPORT_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceSettings {
    Live {
        token: String,
        api_base: String,
        timeout: Duration,
    },
    Snapshot(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    RoleMembers {
        role_ids: Vec<RoleID>,
    },
    RoleLinks {
        role_map: PathBuf,
        profiles: PathBuf,
        concurrency: usize,
    },
}

/// Validated configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub guild_id: GuildID,
    pub source: SourceSettings,
    pub destination: Destination,
    pub task: Task,
}

fn is_snowflake(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

impl TryFrom<Cli> for Settings {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let guild_id = cli.guild_id.trim().to_string();
        if guild_id.is_empty() {
            return Err(ConfigError::Missing("DISCORD_GUILD_ID"));
        }
        if !is_snowflake(&guild_id) {
            return Err(ConfigError::Invalid {
                name: "DISCORD_GUILD_ID",
                reason: format!("{guild_id:?} is not a numeric id"),
            });
        }

        let source = match cli.snapshot {
            Some(path) => SourceSettings::Snapshot(path),
            None => {
                let token = cli
                    .token
                    .map(|token| token.trim().to_string())
                    .filter(|token| !token.is_empty())
                    .ok_or(ConfigError::Missing("DISCORD_APP_TOKEN"))?;
                if cli.timeout_secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: "DISCORD_TIMEOUT_SECS",
                        reason: "must be positive".to_string(),
                    });
                }
                SourceSettings::Live {
                    token,
                    api_base: cli.api_base,
                    timeout: Duration::from_secs(cli.timeout_secs),
                }
            }
        };

        let destination = if cli.debug {
            Destination::Console
        } else {
            Destination::Directory(cli.output_dir)
        };

        let task = match cli.command {
            Command::Members { roles } => {
                let role_ids: Vec<RoleID> = roles
                    .iter()
                    .map(|role| role.trim())
                    .filter(|role| !role.is_empty())
                    .map(str::to_string)
                    .collect();
                if role_ids.is_empty() {
                    return Err(ConfigError::Missing("DISCORD_ROLES"));
                }
                if let Some(bad) = role_ids.iter().find(|role| !is_snowflake(role)) {
                    return Err(ConfigError::Invalid {
                        name: "DISCORD_ROLES",
                        reason: format!("{bad:?} is not a numeric id"),
                    });
                }
                Task::RoleMembers { role_ids }
            }
            Command::RoleLinks {
                role_map,
                profiles,
                concurrency,
            } => {
                if concurrency == 0 {
                    return Err(ConfigError::Invalid {
                        name: "EXPORT_CONCURRENCY",
                        reason: "must be positive".to_string(),
                    });
                }
                Task::RoleLinks {
                    role_map,
                    profiles,
                    concurrency,
                }
            }
        };

        Ok(Settings {
            guild_id,
            source,
            destination,
            task,
        })
    }
}

#[cfg(test)]
mod test {
    use crate::config::{Cli, Settings, SourceSettings, Task};
    use crate::output::Destination;
    use crate::types::ConfigError;
    use clap::Parser;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Tests here read the process environment.
    static ENV: Mutex<()> = Mutex::new(());

    fn settings(args: &[&str]) -> Result<Settings, ConfigError> {
        let cli = Cli::try_parse_from(std::iter::once("guild-export").chain(args.iter().copied()))
            .unwrap();
        Settings::try_from(cli)
    }

    #[test]
    fn test_members_settings() {
        let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
        let settings = settings(&[
            "--guild-id",
            "100",
            "--token",
            "secret",
            "--output-dir",
            "out",
            "members",
            "--roles",
            "1, 2,,3",
        ])
        .unwrap();
        assert_eq!(settings.guild_id, "100");
        assert_eq!(
            settings.source,
            SourceSettings::Live {
                token: "secret".to_string(),
                api_base: "https://discord.com/api/v10".to_string(),
                timeout: Duration::from_secs(30),
            }
        );
        assert_eq!(settings.destination, Destination::Directory(PathBuf::from("out")));
        assert_eq!(
            settings.task,
            Task::RoleMembers {
                role_ids: vec!["1".to_string(), "2".to_string(), "3".to_string()]
            }
        );
    }

    #[test]
    fn test_role_links_settings() {
        let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
        let settings = settings(&[
            "--guild-id",
            "100",
            "--snapshot",
            "guild.json",
            "--debug",
            "role-links",
        ])
        .unwrap();
        assert_eq!(
            settings.source,
            SourceSettings::Snapshot(PathBuf::from("guild.json"))
        );
        assert_eq!(settings.destination, Destination::Console);
        assert_eq!(
            settings.task,
            Task::RoleLinks {
                role_map: PathBuf::from("jsons/discord_role_ids.json"),
                profiles: PathBuf::from("jsons/profile_ids-server_member_ids.json"),
                concurrency: 4,
            }
        );
    }

    #[test]
    fn test_invalid_settings() {
        let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
        assert!(matches!(
            settings(&["--guild-id", "100", "--token", " ", "role-links"]),
            Err(ConfigError::Missing("DISCORD_APP_TOKEN"))
        ));
        assert!(matches!(
            settings(&["--guild-id", "abc", "--token", "t", "role-links"]),
            Err(ConfigError::Invalid { name: "DISCORD_GUILD_ID", .. })
        ));
        assert!(matches!(
            settings(&["--guild-id", "100", "--token", "t", "members", "--roles", " , "]),
            Err(ConfigError::Missing("DISCORD_ROLES"))
        ));
        assert!(matches!(
            settings(&["--guild-id", "100", "--token", "t", "members", "--roles", "1,r2"]),
            Err(ConfigError::Invalid { name: "DISCORD_ROLES", .. })
        ));
        assert!(matches!(
            settings(&["--guild-id", "100", "--token", "t", "--timeout-secs", "0", "role-links"]),
            Err(ConfigError::Invalid { name: "DISCORD_TIMEOUT_SECS", .. })
        ));
        assert!(matches!(
            settings(&["--guild-id", "100", "--token", "t", "role-links", "--concurrency", "0"]),
            Err(ConfigError::Invalid { name: "EXPORT_CONCURRENCY", .. })
        ));
    }

    fn destination_for_debug_env(value: &str) -> Destination {
        std::env::set_var("DEBUG", value);
        let result = settings(&["--guild-id", "100", "--token", "t", "role-links"]);
        std::env::remove_var("DEBUG");
        result.unwrap().destination
    }

    #[test]
    fn test_debug_env_values() {
        let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
        for on in ["1", "true", "yes", "on", "TRUE", "anything"] {
            assert_eq!(destination_for_debug_env(on), Destination::Console, "{on}");
        }
        for off in ["", "0", "false", "no", "off"] {
            assert_eq!(
                destination_for_debug_env(off),
                Destination::Directory(PathBuf::from(".")),
                "{off:?}"
            );
        }
    }

    #[test]
    fn test_debug_flag_values() {
        let _env = ENV.lock().unwrap_or_else(|e| e.into_inner());
        let destination = |args: &[&str]| {
            let mut all = vec!["--guild-id", "100", "--token", "t"];
            all.extend_from_slice(args);
            all.push("role-links");
            settings(&all).unwrap().destination
        };
        assert_eq!(destination(&["--debug"]), Destination::Console);
        assert_eq!(destination(&["--debug=1"]), Destination::Console);
        assert_eq!(
            destination(&["--debug=off"]),
            Destination::Directory(PathBuf::from("."))
        );
        assert_eq!(destination(&[]), Destination::Directory(PathBuf::from(".")));
    }
}
