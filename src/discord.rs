use crate::member::{ApiGuild, ApiMember, ApiRole, ApiUser, MembershipRecord};
use crate::source::GuildSource;
use crate::types::SourceError;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// Largest page the member list endpoint accepts.
const MEMBERS_PAGE_LIMIT: usize = 1000;

/// Discord REST API client authenticated as a bot.
pub struct DiscordHttp {
    http: reqwest::Client,
    api_base: String,
}

impl DiscordHttp {
    /// Builds the client and checks the token against the current user endpoint.
    pub async fn connect(
        token: &str,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let mut auth = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_| SourceError::Unauthorized("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!(
                "DiscordBot (",
                env!("CARGO_PKG_NAME"),
                ", ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Transient(format!("http client: {e}")))?;

        let client = Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        };
        let me: ApiUser = client.get("/users/@me", "current user").await?;
        info!(target: "discord", "Connected as {} ({}).", me.username, me.id);
        Ok(client)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T, SourceError> {
        let url = format!("{}{}", self.api_base, path);
        debug!(target: "discord", "GET {url}");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(what, e))?;

        let status = response.status();
        if !status.is_success() {
            if let Some(retry_after) = response.headers().get(RETRY_AFTER) {
                warn!(target: "discord", "Rate limited on {what}, retry after {retry_after:?}s.");
            }
            return Err(status_error(status, what));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Transient(format!("{what}: undecodable body: {e}")))
    }
}

fn request_error(what: &str, e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Transient(format!("{what}: timed out"))
    } else {
        SourceError::Transient(format!("{what}: {e}"))
    }
}

fn status_error(status: StatusCode, what: &str) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED => SourceError::Unauthorized(format!("{what}: HTTP {status}")),
        _ => SourceError::Transient(format!("{what}: HTTP {status}")),
    }
}

/// Walks the member list by user id cursor until a page comes back short.
async fn collect_pages<F, Fut>(
    page_limit: usize,
    mut fetch_page: F,
) -> Result<Vec<MembershipRecord>, SourceError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<ApiMember>, SourceError>>,
{
    let mut records = Vec::new();
    let mut after = "0".to_string();
    loop {
        let page = fetch_page(after.clone()).await?;
        let page_len = page.len();
        if let Some(last) = page.last() {
            after = last.user.id.clone();
        }
        records.extend(page.into_iter().map(MembershipRecord::from));
        debug!(target: "discord", "Fetched {} members so far.", records.len());
        if page_len < page_limit {
            return Ok(records);
        }
    }
}

#[async_trait]
impl GuildSource for DiscordHttp {
    async fn guild(&self, guild_id: &str) -> Result<ApiGuild, SourceError> {
        self.get(&format!("/guilds/{guild_id}"), &format!("guild {guild_id}"))
            .await
    }

    async fn role(&self, guild_id: &str, role_id: &str) -> Result<ApiRole, SourceError> {
        let roles: Vec<ApiRole> = self
            .get(
                &format!("/guilds/{guild_id}/roles"),
                &format!("roles of guild {guild_id}"),
            )
            .await?;
        roles
            .into_iter()
            .find(|role| role.id == role_id)
            .ok_or_else(|| SourceError::NotFound(format!("role {role_id}")))
    }

    async fn members(&self, guild_id: &str) -> Result<Vec<MembershipRecord>, SourceError> {
        let what = format!("members of guild {guild_id}");
        collect_pages(MEMBERS_PAGE_LIMIT, |after| {
            let path = format!("/guilds/{guild_id}/members?limit={MEMBERS_PAGE_LIMIT}&after={after}");
            let what = &what;
            async move { self.get(&path, what).await }
        })
        .await
    }

    async fn member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<MembershipRecord, SourceError> {
        let member: ApiMember = self
            .get(
                &format!("/guilds/{guild_id}/members/{user_id}"),
                &format!("member {user_id}"),
            )
            .await?;
        Ok(MembershipRecord::from(member))
    }

    async fn close(&self) {
        info!(target: "discord", "Disconnected.");
    }
}
