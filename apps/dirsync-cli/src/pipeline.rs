//! Action tree construction and execution.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, Instrument};

use dirsync_connector_ldap::{DirectoryConnectionFactory, Ldap3ConnectionFactory, LdapConnector};
use dirsync_connector_sql::{PgConnectionFactory, SqlConnectionFactory, SqlConnector};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::{Action, ActionSettings, CredentialStore, ErrorEntry, ErrorLog, ProfileStore, RunSummary};
use dirsync_replay::{LoggingProfileStore, ProfileReplayer};

use crate::config::{ActionKind, ActionNodeConfig, PipelineConfig};
use crate::credentials::EnvCredentialStore;

/// External systems the steps talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn DirectoryConnectionFactory>,
    pub sql: Arc<dyn SqlConnectionFactory>,
    pub profiles: Arc<dyn ProfileStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Collaborators {
    /// Production collaborators for `config`.
    ///
    /// Replay goes through [`LoggingProfileStore`]; nothing is written to a
    /// remote profile store.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            directory: Arc::new(Ldap3ConnectionFactory),
            sql: Arc::new(PgConnectionFactory::new(config.connections.clone())),
            profiles: Arc::new(LoggingProfileStore),
            credentials: Arc::new(EnvCredentialStore::from_env()),
        }
    }
}

/// One step of the pipeline with its children.
pub struct ActionNode {
    action: Box<dyn Action>,
    children: Vec<ActionNode>,
    errors: ErrorLog,
}

type NodeFuture<'a> = Pin<Box<dyn Future<Output = SyncResult<()>> + Send + 'a>>;

impl ActionNode {
    /// Build a node and its children.
    pub fn build(config: &ActionNodeConfig, collaborators: &Collaborators) -> SyncResult<Self> {
        let settings = config.settings.clone();
        let action: Box<dyn Action> = match &config.kind {
            ActionKind::Ldap(ldap) => Box::new(LdapConnector::new(
                settings,
                ldap.clone(),
                collaborators.directory.clone(),
                collaborators.credentials.clone(),
            )?),
            ActionKind::Sql(sql) => Box::new(SqlConnector::new(
                settings,
                sql.clone(),
                collaborators.sql.clone(),
            )?),
            ActionKind::ProfileReplay(replay) => Box::new(ProfileReplayer::new(
                settings,
                replay.clone(),
                collaborators.profiles.clone(),
            )?),
        };

        let children = config
            .actions
            .iter()
            .map(|child| Self::build(child, collaborators))
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(Self {
            action,
            children,
            errors: ErrorLog::default(),
        })
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    pub fn children(&self) -> &[ActionNode] {
        &self.children
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// Run this step, then its children with this step's settings as parent.
    fn execute<'a>(
        &'a mut self,
        parent: Option<&'a ActionSettings>,
        now: DateTime<Utc>,
        summaries: &'a mut Vec<RunSummary>,
    ) -> NodeFuture<'a> {
        Box::pin(async move {
            let Self {
                action,
                children,
                errors,
            } = self;

            let span = info_span!("action", name = %action.name());
            match action.execute(parent, now).instrument(span).await {
                Ok(summary) => {
                    info!(%summary, "Action finished");
                    summaries.push(summary);
                }
                Err(e) => {
                    error!(action = %action.name(), code = e.error_code(), error = %e, "Action aborted");
                    errors.record(&e);
                    return Err(e);
                }
            }

            let settings = action.settings();
            for child in children.iter_mut() {
                child.execute(Some(settings), now, summaries).await?;
            }
            Ok(())
        })
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Summaries of the steps that completed, in execution order.
    pub summaries: Vec<RunSummary>,
    /// The error that aborted the run, if any.
    pub failure: Option<SyncError>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// The configured step forest.
pub struct Pipeline {
    roots: Vec<ActionNode>,
}

impl Pipeline {
    pub fn build(config: &PipelineConfig, collaborators: &Collaborators) -> SyncResult<Self> {
        let roots = config
            .actions
            .iter()
            .map(|node| ActionNode::build(node, collaborators))
            .collect::<SyncResult<Vec<_>>>()?;
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[ActionNode] {
        &self.roots
    }

    /// Run every root in order under one locked timestamp.
    ///
    /// The first error aborts the remaining steps.
    pub async fn run(&mut self, now: DateTime<Utc>) -> PipelineReport {
        info!(%now, roots = self.roots.len(), "Starting pipeline");
        let mut report = PipelineReport::default();
        for root in &mut self.roots {
            if let Err(e) = root.execute(None, now, &mut report.summaries).await {
                report.failure = Some(e);
                break;
            }
        }
        report
    }

    /// Errors recorded during the last run, with the step that raised them.
    pub fn errors(&self) -> Vec<(&str, &ErrorEntry)> {
        fn collect<'a>(nodes: &'a [ActionNode], out: &mut Vec<(&'a str, &'a ErrorEntry)>) {
            for node in nodes {
                out.extend(node.errors.entries().iter().map(|e| (node.name(), e)));
                collect(&node.children, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.roots, &mut out);
        out
    }
}
