use anyhow::{anyhow, Context};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use crate::model::{Application, BindingKey, BranchBinding, EntityKind, Id, Page};
use crate::store::traits::{ApplicationStore, BindingStore, PageStore, StoreError, StoreResult};

/// Tables are created idempotently; documents live in JSONB next to the
/// columns queries filter on.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS applications (
        id TEXT PRIMARY KEY,
        default_application_id TEXT NOT NULL,
        branch_name TEXT NOT NULL,
        name TEXT NOT NULL,
        org_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        version BIGINT NOT NULL,
        document JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS applications_name_idx ON applications (name)",
    r#"
    CREATE TABLE IF NOT EXISTS pages (
        id TEXT PRIMARY KEY,
        application_id TEXT NOT NULL,
        default_page_id TEXT NOT NULL,
        branch_name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        version BIGINT NOT NULL,
        document JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS pages_application_idx ON pages (application_id)",
    r#"
    CREATE TABLE IF NOT EXISTS branch_bindings (
        kind TEXT NOT NULL,
        default_id TEXT NOT NULL,
        branch_name TEXT NOT NULL,
        concrete_id TEXT NOT NULL,
        PRIMARY KEY (kind, default_id, branch_name)
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the tables this store needs
    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema statement")?;
        }
        log::info!("Schema ready ({} statements applied)", SCHEMA.len());
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn row_exists(&self, table: &str, id: &Id) -> StoreResult<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = $1", table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check row existence")?;
        Ok(row.is_some())
    }
}

fn version_column(version: u64) -> anyhow::Result<i64> {
    i64::try_from(version).map_err(|_| anyhow!("version {} does not fit BIGINT", version))
}

fn application_from_row(row: &PgRow) -> anyhow::Result<Application> {
    let document: serde_json::Value = row.try_get("document").context("Missing document column")?;
    let version: i64 = row.try_get("version").context("Missing version column")?;
    let mut application: Application =
        serde_json::from_value(document).context("Failed to deserialize application")?;
    application.version = version as u64;
    Ok(application)
}

fn page_from_row(row: &PgRow) -> anyhow::Result<Page> {
    let document: serde_json::Value = row.try_get("document").context("Missing document column")?;
    let version: i64 = row.try_get("version").context("Missing version column")?;
    let mut page: Page = serde_json::from_value(document).context("Failed to deserialize page")?;
    page.version = version as u64;
    Ok(page)
}

fn kind_from_column(kind: &str) -> anyhow::Result<EntityKind> {
    match kind {
        "application" => Ok(EntityKind::Application),
        "page" => Ok(EntityKind::Page),
        other => Err(anyhow!("unknown binding kind '{}'", other)),
    }
}

#[async_trait::async_trait]
impl ApplicationStore for PostgresStore {
    async fn get_application(&self, id: &Id) -> StoreResult<Option<Application>> {
        let row = sqlx::query("SELECT version, document FROM applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch application")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(application_from_row(&row)?))
    }

    async fn list_applications_by_name(&self, name: &str) -> StoreResult<Vec<Application>> {
        let rows = sqlx::query(
            "SELECT version, document FROM applications WHERE name = $1 ORDER BY created_at",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list applications by name")?;

        let applications = rows
            .iter()
            .map(application_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(applications)
    }

    async fn save_application(&self, application: Application) -> StoreResult<Application> {
        let expected = application.version;
        let mut record = application;
        record.version = expected + 1;
        let document = serde_json::to_value(&record).context("Failed to serialize application")?;

        let result = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO applications (id, default_application_id, branch_name, name, org_id, created_at, version, document)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&record.id)
            .bind(&record.default_application_id)
            .bind(&record.branch_name)
            .bind(&record.name)
            .bind(&record.org_id)
            .bind(record.created_at)
            .bind(version_column(record.version)?)
            .bind(&document)
            .execute(&self.pool)
            .await
            .context("Failed to insert application")?
        } else {
            sqlx::query(
                r#"
                UPDATE applications
                SET name = $2, branch_name = $3, version = $4, document = $5
                WHERE id = $1 AND version = $6
                "#,
            )
            .bind(&record.id)
            .bind(&record.name)
            .bind(&record.branch_name)
            .bind(version_column(record.version)?)
            .bind(&document)
            .bind(version_column(expected)?)
            .execute(&self.pool)
            .await
            .context("Failed to update application")?
        };

        if result.rows_affected() == 0 {
            if expected != 0 && !self.row_exists("applications", &record.id).await? {
                return Err(StoreError::NotFound {
                    entity: EntityKind::Application,
                    id: record.id,
                });
            }
            return Err(StoreError::Conflict {
                entity: EntityKind::Application,
                id: record.id,
                expected,
            });
        }

        Ok(record)
    }

    async fn restore_application(&self, application: Application) -> StoreResult<()> {
        let document =
            serde_json::to_value(&application).context("Failed to serialize application")?;
        sqlx::query(
            r#"
            INSERT INTO applications (id, default_application_id, branch_name, name, org_id, created_at, version, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                branch_name = EXCLUDED.branch_name,
                version = EXCLUDED.version,
                document = EXCLUDED.document
            "#,
        )
        .bind(&application.id)
        .bind(&application.default_application_id)
        .bind(&application.branch_name)
        .bind(&application.name)
        .bind(&application.org_id)
        .bind(application.created_at)
        .bind(version_column(application.version)?)
        .bind(&document)
        .execute(&self.pool)
        .await
        .context("Failed to restore application")?;

        Ok(())
    }

    async fn delete_application(&self, id: &Id) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete application")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl PageStore for PostgresStore {
    async fn get_page(&self, id: &Id) -> StoreResult<Option<Page>> {
        let row = sqlx::query("SELECT version, document FROM pages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch page")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(page_from_row(&row)?))
    }

    async fn list_pages_for_application(&self, application_id: &Id) -> StoreResult<Vec<Page>> {
        let rows = sqlx::query(
            "SELECT version, document FROM pages WHERE application_id = $1 ORDER BY created_at",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pages")?;

        let pages = rows
            .iter()
            .map(page_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(pages)
    }

    async fn save_page(&self, page: Page) -> StoreResult<Page> {
        let expected = page.version;
        let mut record = page;
        record.version = expected + 1;
        let document = serde_json::to_value(&record).context("Failed to serialize page")?;

        let result = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO pages (id, application_id, default_page_id, branch_name, created_at, version, document)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&record.id)
            .bind(&record.application_id)
            .bind(&record.default_page_id)
            .bind(&record.branch_name)
            .bind(record.created_at)
            .bind(version_column(record.version)?)
            .bind(&document)
            .execute(&self.pool)
            .await
            .context("Failed to insert page")?
        } else {
            sqlx::query(
                "UPDATE pages SET version = $2, document = $3 WHERE id = $1 AND version = $4",
            )
            .bind(&record.id)
            .bind(version_column(record.version)?)
            .bind(&document)
            .bind(version_column(expected)?)
            .execute(&self.pool)
            .await
            .context("Failed to update page")?
        };

        if result.rows_affected() == 0 {
            if expected != 0 && !self.row_exists("pages", &record.id).await? {
                return Err(StoreError::NotFound {
                    entity: EntityKind::Page,
                    id: record.id,
                });
            }
            return Err(StoreError::Conflict {
                entity: EntityKind::Page,
                id: record.id,
                expected,
            });
        }

        Ok(record)
    }

    async fn restore_page(&self, page: Page) -> StoreResult<()> {
        let document = serde_json::to_value(&page).context("Failed to serialize page")?;
        sqlx::query(
            r#"
            INSERT INTO pages (id, application_id, default_page_id, branch_name, created_at, version, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                document = EXCLUDED.document
            "#,
        )
        .bind(&page.id)
        .bind(&page.application_id)
        .bind(&page.default_page_id)
        .bind(&page.branch_name)
        .bind(page.created_at)
        .bind(version_column(page.version)?)
        .bind(&document)
        .execute(&self.pool)
        .await
        .context("Failed to restore page")?;

        Ok(())
    }

    async fn delete_page(&self, id: &Id) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete page")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl BindingStore for PostgresStore {
    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Option<BranchBinding>> {
        let row = sqlx::query(
            r#"
            SELECT kind, default_id, branch_name, concrete_id
            FROM branch_bindings
            WHERE kind = $1 AND default_id = $2 AND branch_name = $3
            "#,
        )
        .bind(key.kind.as_str())
        .bind(&key.default_id)
        .bind(&key.branch_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch branch binding")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: String = row.try_get("kind").context("Missing kind column")?;
        Ok(Some(BranchBinding {
            kind: kind_from_column(&kind)?,
            default_id: row.try_get("default_id").context("Missing default_id column")?,
            branch_name: row
                .try_get("branch_name")
                .context("Missing branch_name column")?,
            concrete_id: row
                .try_get("concrete_id")
                .context("Missing concrete_id column")?,
        }))
    }

    async fn insert_binding(&self, binding: BranchBinding) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO branch_bindings (kind, default_id, branch_name, concrete_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, default_id, branch_name) DO NOTHING
            "#,
        )
        .bind(binding.kind.as_str())
        .bind(&binding.default_id)
        .bind(&binding.branch_name)
        .bind(&binding.concrete_id)
        .execute(&self.pool)
        .await
        .context("Failed to insert branch binding")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                entity: binding.kind,
                id: binding.key().to_string(),
                expected: 0,
            });
        }
        Ok(())
    }

    async fn put_binding(&self, binding: BranchBinding) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO branch_bindings (kind, default_id, branch_name, concrete_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, default_id, branch_name) DO UPDATE SET
                concrete_id = EXCLUDED.concrete_id
            "#,
        )
        .bind(binding.kind.as_str())
        .bind(&binding.default_id)
        .bind(&binding.branch_name)
        .bind(&binding.concrete_id)
        .execute(&self.pool)
        .await
        .context("Failed to upsert branch binding")?;

        Ok(())
    }

    async fn remove_binding(&self, key: &BindingKey) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM branch_bindings WHERE kind = $1 AND default_id = $2 AND branch_name = $3",
        )
        .bind(key.kind.as_str())
        .bind(&key.default_id)
        .bind(&key.branch_name)
        .execute(&self.pool)
        .await
        .context("Failed to delete branch binding")?;

        Ok(result.rows_affected() > 0)
    }
}
