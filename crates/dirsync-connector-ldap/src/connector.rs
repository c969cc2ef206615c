//! LDAP Connector implementation
//!
//! Pages through a subtree search and stages every page as one batch file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ldap3::controls::{Control, ControlType, MakeCritical, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, info, instrument, warn};

use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::{
    account_disabled, Action, ActionSettings, BatchStager, Credential, CredentialStore,
    DirectoryRecord, RunSummary,
};

use crate::config::LdapConfig;
use crate::filter::build_query_filter;

const USER_ACCOUNT_CONTROL: &str = "userAccountControl";

/// Result code for invalid credentials.
const LDAP_INVALID_CREDENTIALS: u32 = 49;

/// Parameters of one paged subtree search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedSearch {
    pub base: String,
    pub filter: String,
    pub attributes: Vec<String>,
    pub page_size: u32,
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub records: Vec<DirectoryRecord>,
    /// Continuation cookie; empty once the server has no more pages.
    pub cookie: Vec<u8>,
}

/// A bound directory session.
#[async_trait]
pub trait DirectorySession: Send {
    /// Fetch the page that follows `cookie` (empty for the first page).
    async fn search_page(&mut self, search: &PagedSearch, cookie: &[u8]) -> SyncResult<SearchPage>;

    async fn unbind(&mut self) -> SyncResult<()>;
}

/// Opens bound directory sessions.
#[async_trait]
pub trait DirectoryConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        config: &LdapConfig,
        credential: &Credential,
    ) -> SyncResult<Box<dyn DirectorySession>>;
}

/// Convert a search entry into a record.
///
/// Only the first value of each attribute is kept. Values the server
/// returned as binary are marked unreadable. The disabled flag is decoded
/// from `userAccountControl`.
pub fn entry_to_record(entry: SearchEntry) -> DirectoryRecord {
    let uac = entry
        .attrs
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(USER_ACCOUNT_CONTROL))
        .and_then(|(_, values)| values.first())
        .map(String::as_str);

    let mut record = DirectoryRecord::new().with_account_disabled(account_disabled(uac));
    record.insert("dn", entry.dn);
    for (name, values) in entry.attrs {
        if let Some(first) = values.into_iter().next() {
            record.insert(&name, first);
        }
    }
    for (name, values) in entry.bin_attrs {
        if let Some(first) = values.first() {
            record.mark_unreadable(
                &name,
                format!("{} byte value is not valid UTF-8", first.len()),
            );
        }
    }
    record
}

/// Connection factory backed by `ldap3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3ConnectionFactory;

#[async_trait]
impl DirectoryConnectionFactory for Ldap3ConnectionFactory {
    async fn connect(
        &self,
        config: &LdapConfig,
        credential: &Credential,
    ) -> SyncResult<Box<dyn DirectorySession>> {
        let url = config.url();
        let timeout = Duration::from_secs(config.query_timeout_secs);

        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_starttls(config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                SyncError::connection_failed_with_source(
                    format!("Failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        debug!(bind_dn = %credential.username, "Performing LDAP bind");

        let result = ldap
            .simple_bind(&credential.username, &credential.password)
            .await
            .map_err(|e| {
                SyncError::connection_failed_with_source(
                    format!("LDAP bind failed for {}", credential.username),
                    e,
                )
            })?;

        if result.rc != 0 {
            if result.rc == LDAP_INVALID_CREDENTIALS {
                return Err(SyncError::AuthenticationFailed {
                    message: format!("invalid credentials for {}", credential.username),
                });
            }
            return Err(SyncError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %config.host, "LDAP connection established");

        Ok(Box::new(Ldap3Session { ldap, timeout }))
    }
}

struct Ldap3Session {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn search_page(&mut self, search: &PagedSearch, cookie: &[u8]) -> SyncResult<SearchPage> {
        let paging = PagedResults {
            size: search.page_size as i32,
            cookie: cookie.to_vec(),
        };
        let attrs: Vec<&str> = search.attributes.iter().map(String::as_str).collect();

        let result = self
            .ldap
            .with_controls(paging.critical())
            .with_timeout(self.timeout)
            .search(&search.base, Scope::Subtree, &search.filter, attrs)
            .await
            .map_err(|e| SyncError::query_failed_with_source("LDAP search failed", e))?;

        let (entries, res) = result
            .success()
            .map_err(|e| SyncError::query_failed_with_source("LDAP search was rejected", e))?;

        let cookie = res
            .ctrls
            .iter()
            .find_map(|ctrl| match ctrl {
                Control(Some(ControlType::PagedResults), raw) => {
                    Some(raw.parse::<PagedResults>().cookie)
                }
                _ => None,
            })
            .unwrap_or_default();

        let records = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_to_record)
            .collect();

        Ok(SearchPage { records, cookie })
    }

    async fn unbind(&mut self) -> SyncResult<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| SyncError::connection_failed_with_source("LDAP unbind failed", e))
    }
}

/// LDAP extraction step.
pub struct LdapConnector {
    settings: ActionSettings,
    config: LdapConfig,
    factory: Arc<dyn DirectoryConnectionFactory>,
    credentials: Arc<dyn CredentialStore>,
}

impl LdapConnector {
    /// Create a connector over the given connection factory.
    pub fn new(
        settings: ActionSettings,
        config: LdapConfig,
        factory: Arc<dyn DirectoryConnectionFactory>,
        credentials: Arc<dyn CredentialStore>,
    ) -> SyncResult<Self> {
        config.validate()?;
        settings.validate()?;
        if settings.properties.get(config.user_name_index).is_none() {
            return Err(SyncError::invalid_configuration(format!(
                "user_name_index {} does not match any property",
                config.user_name_index
            )));
        }

        Ok(Self {
            settings,
            config,
            factory,
            credentials,
        })
    }

    /// Create a connector talking to a real directory server.
    pub fn with_ldap3(
        settings: ActionSettings,
        config: LdapConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> SyncResult<Self> {
        Self::new(settings, config, Arc::new(Ldap3ConnectionFactory), credentials)
    }

    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    fn resolve_credential(&self) -> SyncResult<Credential> {
        if let Some(name) = self.config.service_login.as_deref() {
            return self.credentials.read(name);
        }
        Ok(Credential {
            username: self.config.bind_dn.clone().unwrap_or_default(),
            password: self.config.bind_password.clone().unwrap_or_default(),
        })
    }

    fn paged_search(&self, now: DateTime<Utc>) -> PagedSearch {
        let mut attributes: Vec<String> = self
            .settings
            .properties
            .source_keys()
            .into_iter()
            .map(str::to_string)
            .collect();
        if !attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(USER_ACCOUNT_CONTROL))
        {
            attributes.push(USER_ACCOUNT_CONTROL.to_string());
        }

        PagedSearch {
            base: self.config.search_root.clone(),
            filter: build_query_filter(
                &self.config.batch_action,
                now,
                self.config.delta_period_days,
            ),
            attributes,
            page_size: self.config.page_size,
        }
    }

    async fn stage_all(
        &self,
        session: &mut dyn DirectorySession,
        search: &PagedSearch,
        stager: &mut BatchStager,
    ) -> SyncResult<()> {
        let mut cookie = Vec::new();
        loop {
            let page = session.search_page(search, &cookie).await?;
            debug!(entries = page.records.len(), "Received search page");
            stager.stage_page(&page.records)?;
            if page.cookie.is_empty() {
                return Ok(());
            }
            cookie = page.cookie;
        }
    }
}

#[async_trait]
impl Action for LdapConnector {
    fn name(&self) -> &str {
        &self.config.connector_name
    }

    fn settings(&self) -> &ActionSettings {
        &self.settings
    }

    #[instrument(skip(self, _parent), fields(host = %self.config.host))]
    async fn execute(
        &self,
        _parent: Option<&ActionSettings>,
        now: DateTime<Utc>,
    ) -> SyncResult<RunSummary> {
        let search = self.paged_search(now);
        let credential = self.resolve_credential()?;

        info!(host = %self.config.host, "Establishing LDAP connection");
        let mut session = self.factory.connect(&self.config, &credential).await?;

        info!(
            mode = %self.config.batch_action,
            filter = %search.filter,
            "Searching directory"
        );
        let mut stager = BatchStager::new(
            &self.config.connector_name,
            &self.settings.directory_location,
            self.settings.properties.clone(),
            Some(self.config.user_name_rule()),
        )
        .skip_disabled(self.config.skip_disabled_accounts);

        let staged = self.stage_all(session.as_mut(), &search, &mut stager).await;
        if let Err(e) = session.unbind().await {
            warn!(error = %e, "Failed to unbind LDAP session");
        }
        staged?;

        let summary = stager.into_summary();
        info!(
            host = %self.config.host,
            processed = summary.processed(),
            failed = summary.failed(),
            skipped = summary.counters.skipped,
            "Extraction complete"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for LdapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConnector")
            .field("settings", &self.settings)
            .field("config", &self.config.redacted())
            .finish()
    }
}
