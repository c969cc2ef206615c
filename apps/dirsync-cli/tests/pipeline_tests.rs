//! Pipeline execution over stub collaborators.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dirsync_cli::{Collaborators, EnvCredentialStore, Pipeline, PipelineConfig};
use dirsync_connector_ldap::{
    DirectoryConnectionFactory, DirectorySession, LdapConfig, PagedSearch, SearchPage,
};
use dirsync_connector_sql::{SqlConnectionFactory, SqlSession};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::{Credential, DirectoryRecord, ProfileStore, PropertyChange};

// =============================================================================
// Stubs
// =============================================================================

/// Directory serving all entries in one page, or failing every search.
#[derive(Default)]
struct OnePageDirectory {
    entries: Vec<DirectoryRecord>,
    fail_search: bool,
    filters: Arc<Mutex<Vec<String>>>,
}

struct OnePageSession {
    entries: Vec<DirectoryRecord>,
    fail_search: bool,
    filters: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DirectoryConnectionFactory for OnePageDirectory {
    async fn connect(
        &self,
        _config: &LdapConfig,
        _credential: &Credential,
    ) -> SyncResult<Box<dyn DirectorySession>> {
        Ok(Box::new(OnePageSession {
            entries: self.entries.clone(),
            fail_search: self.fail_search,
            filters: self.filters.clone(),
        }))
    }
}

#[async_trait]
impl DirectorySession for OnePageSession {
    async fn search_page(&mut self, search: &PagedSearch, _cookie: &[u8]) -> SyncResult<SearchPage> {
        self.filters.lock().unwrap().push(search.filter.clone());
        if self.fail_search {
            return Err(SyncError::query_failed("size limit exceeded"));
        }
        Ok(SearchPage {
            records: self.entries.clone(),
            cookie: Vec::new(),
        })
    }

    async fn unbind(&mut self) -> SyncResult<()> {
        Ok(())
    }
}

struct NoDatabase;

#[async_trait]
impl SqlConnectionFactory for NoDatabase {
    async fn connect(&self, connection_name: &str) -> SyncResult<Box<dyn SqlSession>> {
        Err(SyncError::connection_failed(format!(
            "no database behind '{connection_name}'"
        )))
    }
}

#[derive(Default)]
struct RecordingStore {
    updates: Mutex<Vec<(String, Vec<PropertyChange>)>>,
}

#[async_trait]
impl ProfileStore for RecordingStore {
    async fn connect(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn update_properties_by_account(
        &self,
        account: &str,
        changes: &[PropertyChange],
    ) -> SyncResult<()> {
        self.updates
            .lock()
            .unwrap()
            .push((account.to_string(), changes.to_vec()));
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn person(login: &str, mail: &str) -> DirectoryRecord {
    DirectoryRecord::new()
        .with_account_disabled(false)
        .with("sAMAccountName", format!("CONTOSO\\{login}"))
        .with("mail", mail)
}

fn pipeline_yaml(location: &Path) -> String {
    format!(
        r#"
connections:
  Main: postgres://sync@db/identity
actions:
  - type: ldap
    directory_location: {location}
    host: dc01.contoso.com
    search_root: DC=contoso,DC=com
    service_login: svc-sync
    upn_suffix: contoso.com
    batch_action: delta
    properties:
      - {{ index: 0, name: AccountName, mapping: sAMAccountName }}
      - {{ index: 1, name: WorkEmail, mapping: mail, transform: {{ type: changed_value }} }}
    actions:
      - type: profile_replay
        directory_location: {location}
  - type: sql
    stored_procedure: hr.get_users
    upn_suffix: contoso.com
    directory_location: {location}
    properties:
      - {{ index: 0, name: AccountName, mapping: login }}
"#,
        location = location.display()
    )
}

fn collaborators(directory: OnePageDirectory, store: Arc<RecordingStore>) -> Collaborators {
    Collaborators {
        directory: Arc::new(directory),
        sql: Arc::new(NoDatabase),
        profiles: store,
        credentials: Arc::new(EnvCredentialStore::from_vars([
            ("DIRSYNC_CRED_SVC_SYNC_USERNAME".to_string(), "svc-sync".to_string()),
            ("DIRSYNC_CRED_SVC_SYNC_PASSWORD".to_string(), "secret".to_string()),
        ])),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_extract_then_child_replay() {
    dirsync_cli::logging::init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let config: PipelineConfig = serde_yaml::from_str(&pipeline_yaml(dir.path())).unwrap();
    config.validate().unwrap();

    let directory = OnePageDirectory {
        entries: vec![
            person("alice", "alice@contoso.com"),
            person("bob", "bob@contoso.com"),
        ],
        ..OnePageDirectory::default()
    };
    let filters = directory.filters.clone();
    let store = Arc::new(RecordingStore::default());
    let mut pipeline = Pipeline::build(&config, &collaborators(directory, store.clone())).unwrap();
    assert_eq!(pipeline.roots().len(), 2);
    assert_eq!(pipeline.roots()[0].children().len(), 1);

    let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    let report = pipeline.run(now).await;

    // The second root has no database behind it.
    assert_eq!(
        report.failure.as_ref().map(SyncError::error_code),
        Some("CONNECTION_FAILED")
    );
    assert_eq!(report.summaries.len(), 2);
    assert_eq!(report.summaries[0].processed(), 2);
    assert_eq!(report.summaries[1].processed(), 2);
    assert_eq!(report.summaries[1].failed(), 0);

    assert_eq!(
        filters.lock().unwrap().as_slice(),
        ["(&(whenChanged>=20240108000000.0Z)(whenChanged<=20240110000000.0Z)(objectCategory=Person))"]
    );

    let updates = store.updates.lock().unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].0, "i:0#.f|membership|alice@contoso.com");
    assert_eq!(
        updates[0].1[1],
        PropertyChange::changed("WorkEmail", "alice@contoso.com")
    );

    let errors = pipeline.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1.code, "CONNECTION_FAILED");

    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_failed_extraction_skips_children_and_later_roots() {
    let dir = tempfile::tempdir().unwrap();
    let config: PipelineConfig = serde_yaml::from_str(&pipeline_yaml(dir.path())).unwrap();

    let directory = OnePageDirectory {
        fail_search: true,
        ..OnePageDirectory::default()
    };
    let store = Arc::new(RecordingStore::default());
    let mut pipeline = Pipeline::build(&config, &collaborators(directory, store.clone())).unwrap();

    let report = pipeline.run(Utc::now()).await;
    assert!(!report.is_success());
    assert_eq!(
        report.failure.as_ref().map(SyncError::error_code),
        Some("QUERY_FAILED")
    );
    assert!(report.summaries.is_empty());
    assert!(store.updates.lock().unwrap().is_empty());

    let root = &pipeline.roots()[0];
    assert_eq!(root.errors().len(), 1);
    assert!(root.children()[0].errors().is_empty());
}

#[tokio::test]
async fn test_build_rejects_invalid_step() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = pipeline_yaml(dir.path()).replace("batch_action: delta", "page_size: 0");
    let config: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();

    let result = Pipeline::build(
        &config,
        &collaborators(OnePageDirectory::default(), Arc::new(RecordingStore::default())),
    );
    assert!(matches!(
        result,
        Err(SyncError::InvalidConfiguration { .. })
    ));
}
