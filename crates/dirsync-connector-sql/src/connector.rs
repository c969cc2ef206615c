//! SQL Connector implementation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use tracing::{debug, info, instrument};

use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::{Action, ActionSettings, BatchStager, DirectoryRecord, RunSummary};

use crate::config::SqlConfig;

/// An open database session.
#[async_trait]
pub trait SqlSession: Send {
    /// Call `procedure` with positional text `parameters` and return every
    /// row it produces.
    async fn call_procedure(
        &mut self,
        procedure: &str,
        parameters: &[String],
    ) -> SyncResult<Vec<DirectoryRecord>>;

    async fn close(&mut self) {}
}

/// Opens sessions by connection name.
#[async_trait]
pub trait SqlConnectionFactory: Send + Sync {
    async fn connect(&self, connection_name: &str) -> SyncResult<Box<dyn SqlSession>>;
}

/// Escape a SQL identifier for use inside double quotes.
fn escape_identifier(identifier: &str) -> String {
    identifier.replace('"', "\"\"")
}

/// Statement calling `procedure` with `arity` positional parameters.
///
/// Schema-qualified names (`directory.get_users`) are quoted part by part.
pub fn procedure_call_sql(procedure: &str, arity: usize) -> String {
    let name = procedure
        .split('.')
        .map(|part| format!("\"{}\"", escape_identifier(part)))
        .collect::<Vec<_>>()
        .join(".");
    let placeholders = (1..=arity)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT * FROM {name}({placeholders})")
}

/// Read a column as text, whatever its SQL type. `Ok(None)` means NULL.
fn column_text(row: &PgRow, index: usize) -> Result<Option<String>, String> {
    if let Ok(val) = row.try_get::<Option<String>, _>(index) {
        return Ok(val);
    }
    if let Ok(val) = row.try_get::<Option<i64>, _>(index) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<i32>, _>(index) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<i16>, _>(index) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<f64>, _>(index) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<bool>, _>(index) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<uuid::Uuid>, _>(index) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return Ok(val.map(|v| v.to_rfc3339()));
    }
    if let Ok(val) = row.try_get::<Option<NaiveDateTime>, _>(index) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<NaiveDate>, _>(index) {
        return Ok(val.map(|v| v.to_string()));
    }
    let type_name = row
        .columns()
        .get(index)
        .map(|c| c.type_info().name().to_string())
        .unwrap_or_default();
    Err(format!("unsupported column type {type_name}"))
}

/// Build a record from decoded columns.
///
/// NULL becomes an empty value, so only columns absent from the result
/// set count as missing.
fn record_from_columns<'a>(
    columns: impl IntoIterator<Item = (&'a str, Result<Option<String>, String>)>,
) -> DirectoryRecord {
    let mut record = DirectoryRecord::new();
    for (name, value) in columns {
        match value {
            Ok(value) => record.insert(name, value.unwrap_or_default()),
            Err(reason) => record.mark_unreadable(name, reason),
        }
    }
    record
}

fn row_to_record(row: &PgRow) -> DirectoryRecord {
    record_from_columns(
        row.columns()
            .iter()
            .enumerate()
            .map(|(index, column)| (column.name(), column_text(row, index))),
    )
}

/// Connection factory backed by PostgreSQL pools.
pub struct PgConnectionFactory {
    connections: HashMap<String, String>,
    acquire_timeout: Duration,
}

impl PgConnectionFactory {
    /// `connections` maps connection names to connection URLs.
    pub fn new(connections: HashMap<String, String>) -> Self {
        Self {
            connections,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for PgConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.connections.keys().collect();
        names.sort();
        f.debug_struct("PgConnectionFactory")
            .field("connections", &names)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

#[async_trait]
impl SqlConnectionFactory for PgConnectionFactory {
    async fn connect(&self, connection_name: &str) -> SyncResult<Box<dyn SqlSession>> {
        let url = self.connections.get(connection_name).ok_or_else(|| {
            SyncError::invalid_configuration(format!(
                "no connection string named '{connection_name}'"
            ))
        })?;

        debug!(connection = %connection_name, "Creating database connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| {
                SyncError::connection_failed_with_source(
                    format!("Failed to connect to database '{connection_name}'"),
                    e,
                )
            })?;

        Ok(Box::new(PgSession { pool }))
    }
}

struct PgSession {
    pool: PgPool,
}

#[async_trait]
impl SqlSession for PgSession {
    async fn call_procedure(
        &mut self,
        procedure: &str,
        parameters: &[String],
    ) -> SyncResult<Vec<DirectoryRecord>> {
        let sql = procedure_call_sql(procedure, parameters.len());
        let mut query = sqlx::query(&sql);
        for parameter in parameters {
            query = query.bind(parameter.as_str());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            SyncError::query_failed_with_source(format!("Stored procedure {procedure} failed"), e)
        })?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn close(&mut self) {
        self.pool.close().await;
    }
}

/// Stored-procedure extraction step.
pub struct SqlConnector {
    settings: ActionSettings,
    config: SqlConfig,
    factory: Arc<dyn SqlConnectionFactory>,
}

impl SqlConnector {
    pub fn new(
        settings: ActionSettings,
        config: SqlConfig,
        factory: Arc<dyn SqlConnectionFactory>,
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
        })
    }

    pub fn config(&self) -> &SqlConfig {
        &self.config
    }

    async fn fetch_all(&self) -> SyncResult<Vec<DirectoryRecord>> {
        let mut session = self.factory.connect(&self.config.connection_name).await?;

        let timeout_secs = self.config.command_timeout_secs;
        let call = session.call_procedure(&self.config.stored_procedure, &self.config.parameters);
        let result = match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                operation: format!("stored procedure {}", self.config.stored_procedure),
                timeout_secs,
            }),
        };

        session.close().await;
        result
    }
}

#[async_trait]
impl Action for SqlConnector {
    fn name(&self) -> &str {
        &self.config.connector_name
    }

    fn settings(&self) -> &ActionSettings {
        &self.settings
    }

    #[instrument(skip(self, _parent, _now), fields(procedure = %self.config.stored_procedure))]
    async fn execute(
        &self,
        _parent: Option<&ActionSettings>,
        _now: DateTime<Utc>,
    ) -> SyncResult<RunSummary> {
        info!(
            connection = %self.config.connection_name,
            procedure = %self.config.stored_procedure,
            "Calling stored procedure"
        );
        let records = self.fetch_all().await?;
        info!(rows = records.len(), "Stored procedure returned");

        let mut stager = BatchStager::new(
            &self.config.connector_name,
            &self.settings.directory_location,
            self.settings.properties.clone(),
            Some(self.config.user_name_rule()),
        )
        .require_attributes(self.config.require_columns);

        for chunk in records.chunks(self.config.page_size) {
            stager.stage_page(chunk)?;
        }

        let summary = stager.into_summary();
        info!(
            procedure = %self.config.stored_procedure,
            processed = summary.processed(),
            failed = summary.failed(),
            "Extraction complete"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for SqlConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlConnector")
            .field("settings", &self.settings)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use dirsync_core::{PropertyMapping, PropertySchema};

    #[test]
    fn test_procedure_call_sql() {
        assert_eq!(
            procedure_call_sql("get_users", 0),
            "SELECT * FROM \"get_users\"()"
        );
        assert_eq!(
            procedure_call_sql("directory.get_users", 2),
            "SELECT * FROM \"directory\".\"get_users\"($1, $2)"
        );
        assert_eq!(
            procedure_call_sql("bad\"name", 1),
            "SELECT * FROM \"bad\"\"name\"($1)"
        );
    }

    struct StubSession {
        rows: Vec<DirectoryRecord>,
        delay: Duration,
        calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }

    #[async_trait]
    impl SqlSession for StubSession {
        async fn call_procedure(
            &mut self,
            procedure: &str,
            parameters: &[String],
        ) -> SyncResult<Vec<DirectoryRecord>> {
            self.calls
                .lock()
                .unwrap()
                .push((procedure.to_string(), parameters.to_vec()));
            tokio::time::sleep(self.delay).await;
            Ok(self.rows.clone())
        }
    }

    struct StubFactory {
        rows: Vec<DirectoryRecord>,
        delay: Duration,
        calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }

    #[async_trait]
    impl SqlConnectionFactory for StubFactory {
        async fn connect(&self, connection_name: &str) -> SyncResult<Box<dyn SqlSession>> {
            if connection_name != "Main" {
                return Err(SyncError::connection_failed(format!(
                    "unknown connection {connection_name}"
                )));
            }
            Ok(Box::new(StubSession {
                rows: self.rows.clone(),
                delay: self.delay,
                calls: self.calls.clone(),
            }))
        }
    }

    fn settings(location: &std::path::Path) -> ActionSettings {
        ActionSettings::new(
            location,
            PropertySchema::new(vec![
                PropertyMapping::new(0, "AccountName", "account"),
                PropertyMapping::new(1, "WorkEmail", "email"),
            ]),
        )
    }

    fn factory(rows: Vec<DirectoryRecord>, delay: Duration) -> Arc<StubFactory> {
        Arc::new(StubFactory {
            rows,
            delay,
            calls: Arc::default(),
        })
    }

    fn user(name: &str) -> DirectoryRecord {
        DirectoryRecord::new()
            .with("account", name)
            .with("email", format!("{name}@contoso.com"))
    }

    #[tokio::test]
    async fn test_passes_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(vec![user("a")], Duration::ZERO);
        let calls = factory.calls.clone();
        let config = SqlConfig::new("get_users", "contoso.com")
            .with_parameters(vec!["Sales".into(), "2".into()]);

        let connector = SqlConnector::new(settings(dir.path()), config, factory).unwrap();
        connector.execute(None, Utc::now()).await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![(
                "get_users".to_string(),
                vec!["Sales".to_string(), "2".to_string()]
            )]
        );
    }

    #[tokio::test]
    async fn test_missing_column_counted() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![DirectoryRecord::new().with("account", "a")];
        let connector = SqlConnector::new(
            settings(dir.path()),
            SqlConfig::new("get_users", "contoso.com"),
            factory(rows, Duration::ZERO),
        )
        .unwrap();

        let summary = connector.execute(None, Utc::now()).await.unwrap();
        assert_eq!(summary.processed(), 1);
        assert_eq!(summary.failed(), 1);
    }

    #[tokio::test]
    async fn test_null_column_is_empty_cell() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_from_columns([
            ("account", Ok(Some("CONTOSO\\jdoe".to_string()))),
            ("email", Ok(None)),
        ]);
        assert_eq!(record.value("email").unwrap(), Some(""));

        let connector = SqlConnector::new(
            settings(dir.path()),
            SqlConfig::new("get_users", "contoso.com"),
            factory(vec![record], Duration::ZERO),
        )
        .unwrap();

        let summary = connector.execute(None, Utc::now()).await.unwrap();
        assert_eq!(summary.processed(), 1);
        assert_eq!(summary.failed(), 0);

        let text = std::fs::read_to_string(&summary.files[0]).unwrap();
        assert_eq!(
            text.lines().nth(1),
            Some("i:0#.f|membership|jdoe@contoso.com,")
        );
    }

    #[test]
    fn test_unreadable_column_is_marked() {
        let record = record_from_columns([(
            "photo",
            Err("unsupported column type BYTEA".to_string()),
        )]);
        assert!(record.value("photo").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SqlConfig::new("slow_users", "contoso.com");
        config.command_timeout_secs = 5;
        let connector = SqlConnector::new(
            settings(dir.path()),
            config,
            factory(vec![user("a")], Duration::from_secs(60)),
        )
        .unwrap();

        let err = connector.execute(None, Utc::now()).await.unwrap_err();
        assert_eq!(err.error_code(), "TIMEOUT");
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_unknown_connection_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SqlConfig::new("get_users", "contoso.com");
        config.connection_name = "Reporting".into();
        let connector = SqlConnector::new(
            settings(dir.path()),
            config,
            factory(vec![], Duration::ZERO),
        )
        .unwrap();

        let err = connector.execute(None, Utc::now()).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_empty_result_stages_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqlConnector::new(
            settings(dir.path()),
            SqlConfig::new("get_users", "contoso.com"),
            factory(vec![], Duration::ZERO),
        )
        .unwrap();

        let summary = connector.execute(None, Utc::now()).await.unwrap();
        assert_eq!(summary.processed(), 0);
        assert!(summary.files.is_empty());
    }

    #[test]
    fn test_factory_debug_hides_urls() {
        let mut connections = HashMap::new();
        connections.insert(
            "Main".to_string(),
            "postgres://sync:secret@db/identity".to_string(),
        );
        let debug = format!("{:?}", PgConnectionFactory::new(connections));
        assert!(debug.contains("Main"));
        assert!(!debug.contains("secret"));
    }
}
