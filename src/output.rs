use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Stdout, Write};
use std::path::PathBuf;

/// Where finished rows end up.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Directory(PathBuf),
    /// Debug mode, nothing touches the disk.
    Console,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactKind<'a> {
    RoleMembers {
        guild_id: &'a str,
        role_id: &'a str,
        role_name: &'a str,
    },
    RoleLinks,
}

/// `2023-06-08T18:16:00.000Z`
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

pub fn artifact_name(kind: &ArtifactKind, at: DateTime<Utc>) -> String {
    let timestamp = timestamp(at);
    match kind {
        ArtifactKind::RoleMembers {
            guild_id,
            role_id,
            role_name,
        } => format!(
            "guildId_{}-roleName_{}-roleId_{}-members_list_{timestamp}.csv",
            file_safe(guild_id),
            file_safe(role_name),
            file_safe(role_id)
        ),
        ArtifactKind::RoleLinks => format!("upsert_profile_discord_roles-{timestamp}.sql"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReport {
    pub name: String,
    /// `None` when the artifact went to the console.
    pub path: Option<PathBuf>,
    pub rows: usize,
}

enum Out {
    /// Rows go to `partial` until the artifact is finished.
    File {
        writer: BufWriter<File>,
        partial: PathBuf,
        path: PathBuf,
    },
    Console(Stdout),
}

impl Out {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Out::File { writer, .. } => writer,
            Out::Console(stdout) => stdout,
        }
    }
}

/// Sole owner of one artifact's output stream.
///
/// A file artifact only appears under its final name once `finish`
/// succeeds; dropping an unfinished writer removes what was written.
pub struct ArtifactWriter {
    name: String,
    out: Option<Out>,
    rows: usize,
}

impl ArtifactWriter {
    pub fn open(destination: &Destination, name: String) -> std::io::Result<Self> {
        let out = match destination {
            Destination::Directory(dir) => {
                std::fs::create_dir_all(dir)?;
                let partial = dir.join(format!(".{name}.partial"));
                let file = File::create(&partial)?;
                Out::File {
                    writer: BufWriter::new(file),
                    partial,
                    path: dir.join(&name),
                }
            }
            Destination::Console => {
                let mut stdout = std::io::stdout();
                writeln!(stdout, "{name} data:")?;
                Out::Console(stdout)
            }
        };
        Ok(Self {
            name,
            out: Some(out),
            rows: 0,
        })
    }

    fn writer(&mut self) -> std::io::Result<&mut dyn Write> {
        match self.out.as_mut() {
            Some(out) => Ok(out.writer()),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "artifact already closed",
            )),
        }
    }

    /// Writes text that is not a row, such as a header.
    pub fn write_preamble(&mut self, text: &str) -> std::io::Result<()> {
        writeln!(self.writer()?, "{text}")
    }

    pub fn write_row(&mut self, row: &str) -> std::io::Result<()> {
        writeln!(self.writer()?, "{row}")?;
        self.rows += 1;
        Ok(())
    }

    /// Flushes, syncs and closes the artifact, then moves it to its final name.
    pub fn finish(mut self) -> std::io::Result<ArtifactReport> {
        let path = match self.out.take() {
            Some(Out::File {
                writer,
                partial,
                path,
            }) => {
                let synced = writer
                    .into_inner()
                    .map_err(|e| e.into_error())
                    .and_then(|file| file.sync_all())
                    .and_then(|_| std::fs::rename(&partial, &path));
                if let Err(e) = synced {
                    let _ = std::fs::remove_file(&partial);
                    return Err(e);
                }
                info!(target: "output", "Created {} with {} rows.", path.display(), self.rows);
                Some(path)
            }
            Some(Out::Console(mut stdout)) => {
                stdout.flush()?;
                info!(target: "output", "Printed {} with {} rows.", self.name, self.rows);
                None
            }
            None => None,
        };
        Ok(ArtifactReport {
            name: std::mem::take(&mut self.name),
            path,
            rows: self.rows,
        })
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if let Some(Out::File { writer, partial, .. }) = self.out.take() {
            drop(writer);
            warn!(target: "output", "Discarding unfinished {}.", self.name);
            let _ = std::fs::remove_file(partial);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::output::{artifact_name, timestamp, ArtifactKind, ArtifactWriter, Destination};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_timestamp() {
        let at = Utc.with_ymd_and_hms(2023, 6, 8, 18, 16, 0).unwrap();
        assert_eq!(timestamp(at), "2023-06-08T18:16:00.000Z");
    }

    #[test]
    fn test_artifact_names() {
        let at = Utc.with_ymd_and_hms(2023, 6, 8, 18, 16, 0).unwrap();
        assert_eq!(
            artifact_name(
                &ArtifactKind::RoleMembers {
                    guild_id: "100",
                    role_id: "200",
                    role_name: "Mods/Admins",
                },
                at
            ),
            "guildId_100-roleName_Mods_Admins-roleId_200-members_list_2023-06-08T18:16:00.000Z.csv"
        );
        assert_eq!(
            artifact_name(&ArtifactKind::RoleLinks, at),
            "upsert_profile_discord_roles-2023-06-08T18:16:00.000Z.sql"
        );
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = Destination::Directory(dir.path().join("nested"));
        let mut writer = ArtifactWriter::open(&destination, "out.csv".to_string()).unwrap();
        writer.write_preamble("a,b").unwrap();
        writer.write_row("1,2").unwrap();
        writer.write_row("3,4").unwrap();
        let report = writer.finish().unwrap();
        assert_eq!(report.rows, 2);
        let path = report.path.unwrap();
        assert_eq!(path, dir.path().join("nested").join("out.csv"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a,b\n1,2\n3,4\n");
        assert_eq!(std::fs::read_dir(dir.path().join("nested")).unwrap().count(), 1);
    }

    #[test]
    fn test_unfinished_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let destination = Destination::Directory(dir.path().to_path_buf());
        let mut writer = ArtifactWriter::open(&destination, "out.sql".to_string()).unwrap();
        writer.write_preamble("-- header").unwrap();
        writer.write_row("INSERT ...;").unwrap();
        assert!(!dir.path().join("out.sql").exists());
        drop(writer);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_console_creates_no_file() {
        let writer = ArtifactWriter::open(&Destination::Console, "out.csv".to_string()).unwrap();
        let report = writer.finish().unwrap();
        assert_eq!(report.path, None);
        assert_eq!(report.rows, 0);
        assert!(!std::path::Path::new("out.csv").exists());
    }
}
