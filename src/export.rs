use crate::lookup::ReferenceLookup;
use crate::member::MembershipRecord;
use crate::output::{artifact_name, ArtifactKind, ArtifactReport, ArtifactWriter, Destination};
use crate::source::GuildSource;
use crate::transform::{csv_row, sql_block, CSV_HEADER, SQL_HEADER};
use crate::types::{ExportError, RoleID};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    Connecting,
    FetchingSource,
    Transforming,
    Writing,
    Done,
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Records looked at, counted once per role or user they were checked for.
    pub processed: usize,
    pub matched: usize,
    pub filtered: usize,
    pub failed: usize,
    pub artifacts: Vec<ArtifactReport>,
}

/// Progress of one invocation.
#[derive(Debug)]
pub struct Run {
    stage: RunStage,
    summary: RunSummary,
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

impl Run {
    pub fn new() -> Self {
        Self {
            stage: RunStage::Idle,
            summary: RunSummary::default(),
        }
    }

    /// A run that ended before connecting, such as on bad configuration.
    pub fn failed() -> Self {
        let mut run = Self::new();
        run.enter(RunStage::Failed);
        run
    }

    pub fn enter(&mut self, stage: RunStage) {
        debug!(target: "export", "{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Marks the run failed and hands the error back.
    pub fn abort(&mut self, e: ExportError) -> ExportError {
        self.enter(RunStage::Failed);
        e
    }

    fn fail_unit(&mut self, unit: &str, e: &ExportError) {
        self.summary.failed += 1;
        warn!(target: "export", "Skipping {unit}: {e}. {} failures so far.", self.summary.failed);
    }

    /// Logs the totals, whatever state the run ended in.
    pub fn report(&self) {
        let s = &self.summary;
        info!(
            target: "export",
            "Run {:?}: processed {}, matched {}, filtered {}, failed {}, artifacts {}.",
            self.stage,
            s.processed,
            s.matched,
            s.filtered,
            s.failed,
            s.artifacts.len()
        );
        for artifact in &s.artifacts {
            match &artifact.path {
                Some(path) => info!(target: "export", "  {} ({} rows)", path.display(), artifact.rows),
                None => info!(target: "export", "  {} ({} rows, console)", artifact.name, artifact.rows),
            }
        }
    }

    /// True when the run finished and no unit was skipped.
    pub fn succeeded(&self) -> bool {
        self.stage == RunStage::Done && self.summary.failed == 0
    }
}

async fn resolve_guild<S: GuildSource + ?Sized>(
    source: &S,
    guild_id: &str,
    run: &mut Run,
) -> Result<(), ExportError> {
    run.enter(RunStage::FetchingSource);
    match source.guild(guild_id).await {
        Ok(guild) => {
            info!(target: "export", "Guild: {} ({}).", guild.name, guild.id);
            Ok(())
        }
        Err(e) => Err(run.abort(e.into())),
    }
}

/// Writes one CSV artifact per role with the members holding that role.
///
/// Roles that cannot be resolved are skipped without an artifact. A role
/// without members still gets a header-only artifact.
pub async fn export_role_members<S: GuildSource + ?Sized>(
    source: &S,
    guild_id: &str,
    role_ids: &[RoleID],
    destination: &Destination,
    run: &mut Run,
) -> Result<(), ExportError> {
    resolve_guild(source, guild_id, run).await?;

    let mut members: Option<Vec<MembershipRecord>> = None;
    for role_id in role_ids {
        info!(target: "export", "Role id: {role_id}");
        run.enter(RunStage::FetchingSource);
        let role = match source.role(guild_id, role_id).await {
            Ok(role) => role,
            Err(e) => {
                let e = ExportError::from(e);
                if e.is_fatal() {
                    return Err(run.abort(e));
                }
                run.fail_unit(&format!("role {role_id}"), &e);
                continue;
            }
        };
        info!(target: "export", "Role: {}", role.name);

        if members.is_none() {
            match source.members(guild_id).await {
                Ok(fetched) => {
                    info!(target: "export", "Fetched {} guild members.", fetched.len());
                    members = Some(fetched);
                }
                Err(e) => {
                    let e = ExportError::from(e);
                    if e.is_fatal() {
                        return Err(run.abort(e));
                    }
                    run.fail_unit(&format!("role {role_id}"), &e);
                    continue;
                }
            }
        }
        let all = members.as_deref().unwrap_or_default();

        run.enter(RunStage::Transforming);
        let rows: Vec<String> = all
            .iter()
            .filter(|record| record.has_role(role_id))
            .map(csv_row)
            .collect();
        run.summary.processed += all.len();
        run.summary.matched += rows.len();
        run.summary.filtered += all.len() - rows.len();
        info!(target: "export", "Members with role: {}", rows.len());

        run.enter(RunStage::Writing);
        let kind = ArtifactKind::RoleMembers {
            guild_id,
            role_id,
            role_name: &role.name,
        };
        match write_artifact(destination, artifact_name(&kind, chrono::Utc::now()), CSV_HEADER, &rows) {
            Ok(report) => run.summary.artifacts.push(report),
            Err(e) => run.fail_unit(&format!("role {role_id}"), &ExportError::Io(e)),
        }
    }

    run.enter(RunStage::Done);
    Ok(())
}

fn write_artifact(
    destination: &Destination,
    name: String,
    header: &str,
    rows: &[String],
) -> std::io::Result<ArtifactReport> {
    let mut writer = ArtifactWriter::open(destination, name)?;
    writer.write_preamble(header)?;
    for row in rows {
        writer.write_row(row)?;
    }
    writer.finish()
}

/// Writes a single SQL artifact linking every known profile to its mapped roles.
///
/// Member lookups run up to `concurrency` at a time; rows keep the order of
/// the profile list.
pub async fn export_role_links<S: GuildSource + ?Sized>(
    source: &S,
    guild_id: &str,
    lookup: &ReferenceLookup,
    destination: &Destination,
    concurrency: usize,
    run: &mut Run,
) -> Result<(), ExportError> {
    resolve_guild(source, guild_id, run).await?;

    let name = artifact_name(&ArtifactKind::RoleLinks, chrono::Utc::now());
    let mut writer = match ArtifactWriter::open(destination, name) {
        Ok(writer) => writer,
        Err(e) => return Err(run.abort(e.into())),
    };
    if let Err(e) = writer.write_preamble(SQL_HEADER) {
        return Err(run.abort(e.into()));
    }

    let lookups = stream::iter(lookup.profiles())
        .map(move |link| async move { (link, source.member(guild_id, &link.user_id).await) })
        .buffered(concurrency.max(1));
    let mut lookups = std::pin::pin!(lookups);

    run.enter(RunStage::FetchingSource);
    while let Some((link, fetched)) = lookups.next().await {
        debug!(target: "export", "Profile {} -> user {}", link.profile_id, link.user_id);
        run.summary.processed += 1;
        let record = match fetched {
            Ok(record) => record,
            Err(e) => {
                let e = ExportError::from(e);
                if e.is_fatal() {
                    return Err(run.abort(e));
                }
                run.fail_unit(&format!("profile {}", link.profile_id), &e);
                continue;
            }
        };

        run.enter(RunStage::Transforming);
        if record.user_id != link.user_id {
            warn!(target: "export", "Source returned user {} for {}, ignoring.", record.user_id, link.user_id);
            run.summary.filtered += 1;
            continue;
        }
        let Some(block) = sql_block(&record, link.profile_id, lookup) else {
            debug!(target: "export", "{} has no mapped roles.", record.username);
            run.summary.filtered += 1;
            continue;
        };
        info!(target: "export", "Found member {} for profile {}.", record.username, link.profile_id);

        run.enter(RunStage::Writing);
        if let Err(e) = writer.write_row(&block) {
            return Err(run.abort(e.into()));
        }
        run.summary.matched += 1;
    }

    match writer.finish() {
        Ok(report) => run.summary.artifacts.push(report),
        Err(e) => return Err(run.abort(e.into())),
    }
    run.enter(RunStage::Done);
    Ok(())
}
