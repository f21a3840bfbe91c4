//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{BlobRepo, ContainerRepo, NamespaceRepo, ObjectRepo, StatsRepo, VersionRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use depot_core::config::PgSslMode;
use depot_core::models::{BlobsRawSize, ObjectsCount, VersionsCount};
use depot_core::{Blob, Container, DEFAULT_NAMESPACE, Stats, Version, next_version_name};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{PgConnection, Pool, Postgres, Transaction};
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        sqlx::query(
            "INSERT INTO namespaces (name, created_at) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(DEFAULT_NAMESPACE)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn namespace_id(conn: &mut PgConnection, name: &str) -> MetadataResult<i64> {
    sqlx::query_scalar("SELECT id FROM namespaces WHERE name = $1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::NotFound(format!("namespace '{name}'")))
}

async fn container_id(
    conn: &mut PgConnection,
    namespace: &str,
    container: &str,
) -> MetadataResult<i64> {
    sqlx::query_scalar(
        r#"
        SELECT c.id FROM containers c
        JOIN namespaces n ON n.id = c.namespace_id
        WHERE n.name = $1 AND c.name = $2
        "#,
    )
    .bind(namespace)
    .bind(container)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| MetadataError::NotFound(format!("container '{namespace}/{container}'")))
}

async fn version_id(
    conn: &mut PgConnection,
    namespace: &str,
    container: &str,
    version: &str,
    unpublished_only: bool,
) -> MetadataResult<i64> {
    let container_id = container_id(conn, namespace, container).await?;
    let sql = if unpublished_only {
        "SELECT id FROM versions WHERE container_id = $1 AND name = $2 AND NOT is_published FOR UPDATE"
    } else {
        "SELECT id FROM versions WHERE container_id = $1 AND name = $2"
    };
    sqlx::query_scalar(sql)
        .bind(container_id)
        .bind(version)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            let qualifier = if unpublished_only { "unpublished " } else { "" };
            MetadataError::NotFound(format!(
                "{qualifier}version '{namespace}/{container}/{version}'"
            ))
        })
}

async fn blob_id_by_checksum(conn: &mut PgConnection, checksum: &str) -> MetadataResult<i64> {
    sqlx::query_scalar("SELECT id FROM blobs WHERE checksum = $1 ORDER BY id LIMIT 1")
        .bind(checksum)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::NotFound(format!("blob '{checksum}'")))
}

/// Start a read-only transaction whose statements share one snapshot, so a
/// count and the page it describes agree.
async fn begin_snapshot(pool: &Pool<Postgres>) -> MetadataResult<Transaction<'_, Postgres>> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Delete a version and its objects. With `unpublished_only` the version row
/// stays locked until commit so a concurrent publish waits.
async fn remove_version(
    pool: &Pool<Postgres>,
    namespace: &str,
    container: &str,
    version: &str,
    unpublished_only: bool,
) -> MetadataResult<()> {
    let mut tx = pool.begin().await?;
    let id = version_id(&mut tx, namespace, container, version, unpublished_only).await?;

    sqlx::query("DELETE FROM objects WHERE version_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM versions WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn remove_objects(
    pool: &Pool<Postgres>,
    namespace: &str,
    container: &str,
    version: &str,
    keys: &[String],
    unpublished_only: bool,
) -> MetadataResult<()> {
    let mut tx = pool.begin().await?;
    let version_id = version_id(&mut tx, namespace, container, version, unpublished_only).await?;

    sqlx::query(
        "DELETE FROM objects WHERE version_id = $1 AND key_id IN (SELECT id FROM object_keys WHERE key = ANY($2))",
    )
    .bind(version_id)
    .bind(keys)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn versions_by_filter(
    conn: &mut PgConnection,
    container_id: i64,
    published: Option<bool>,
) -> MetadataResult<Vec<Version>> {
    let rows = match published {
        Some(published) => {
            sqlx::query_as::<_, VersionRow>(
                "SELECT * FROM versions WHERE container_id = $1 AND is_published = $2 ORDER BY name",
            )
            .bind(container_id)
            .bind(published)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, VersionRow>(
                "SELECT * FROM versions WHERE container_id = $1 ORDER BY name",
            )
            .bind(container_id)
            .fetch_all(&mut *conn)
            .await?
        }
    };
    Ok(rows.into_iter().map(Version::from).collect())
}

#[async_trait]
impl NamespaceRepo for PostgresStore {
    async fn create_namespace(&self, name: &str) -> MetadataResult<()> {
        sqlx::query("INSERT INTO namespaces (name, created_at) VALUES ($1, $2)")
            .bind(name)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rename_namespace(&self, old_name: &str, new_name: &str) -> MetadataResult<()> {
        let result = sqlx::query("UPDATE namespaces SET name = $1 WHERE name = $2")
            .bind(new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("namespace '{old_name}'")));
        }
        Ok(())
    }

    async fn list_namespaces(&self) -> MetadataResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM namespaces ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn delete_namespace(&self, name: &str) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar("SELECT id FROM namespaces WHERE name = $1 FOR UPDATE")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("namespace '{name}'")))?;

        let containers: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE namespace_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if containers > 0 {
            return Err(MetadataError::Conflict(format!(
                "namespace '{name}' still holds {containers} containers"
            )));
        }

        sqlx::query("DELETE FROM namespaces WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerRepo for PostgresStore {
    async fn create_container(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: Duration,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let namespace_id = namespace_id(&mut tx, namespace).await?;

        sqlx::query(
            "INSERT INTO containers (name, namespace_id, created_at, versions_ttl_seconds) VALUES ($1, $2, $3, $4)",
        )
        .bind(name)
        .bind(namespace_id)
        .bind(OffsetDateTime::now_utc())
        .bind(ttl_to_seconds(versions_ttl))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn rename_container(
        &self,
        namespace: &str,
        old_name: &str,
        new_namespace: &str,
        new_name: &str,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let id = container_id(&mut tx, namespace, old_name).await?;
        let new_namespace_id = namespace_id(&mut tx, new_namespace).await?;

        sqlx::query("UPDATE containers SET name = $1, namespace_id = $2 WHERE id = $3")
            .bind(new_name)
            .bind(new_namespace_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_container_versions_ttl(
        &self,
        namespace: &str,
        name: &str,
        versions_ttl: Duration,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let id = container_id(&mut tx, namespace, name).await?;

        sqlx::query("UPDATE containers SET versions_ttl_seconds = $1 WHERE id = $2")
            .bind(ttl_to_seconds(versions_ttl))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_containers(&self, namespace: &str) -> MetadataResult<Vec<Container>> {
        let mut conn = self.pool.acquire().await?;
        let namespace_id = namespace_id(&mut conn, namespace).await?;

        let rows = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE namespace_id = $1 ORDER BY name",
        )
        .bind(namespace_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(Container::from).collect())
    }

    async fn list_containers_by_page(
        &self,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<Container>)> {
        let mut tx = begin_snapshot(&self.pool).await?;
        let namespace_id = namespace_id(&mut tx, namespace).await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE namespace_id = $1")
                .bind(namespace_id)
                .fetch_one(&mut *tx)
                .await?;

        let rows = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE namespace_id = $1 ORDER BY name LIMIT $2 OFFSET $3",
        )
        .bind(namespace_id)
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((to_u64(total), rows.into_iter().map(Container::from).collect()))
    }

    async fn delete_container(&self, namespace: &str, name: &str) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let id = container_id(&mut tx, namespace, name).await?;

        sqlx::query(
            "DELETE FROM objects WHERE version_id IN (SELECT id FROM versions WHERE container_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM versions WHERE container_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM containers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl VersionRepo for PostgresStore {
    async fn create_version(&self, namespace: &str, container: &str) -> MetadataResult<String> {
        let mut tx = self.pool.begin().await?;
        let container_id = container_id(&mut tx, namespace, container).await?;

        // Serialize version creation per container so names stay strictly increasing.
        sqlx::query("SELECT id FROM containers WHERE id = $1 FOR UPDATE")
            .bind(container_id)
            .execute(&mut *tx)
            .await?;

        let latest: Option<String> =
            sqlx::query_scalar("SELECT MAX(name) FROM versions WHERE container_id = $1")
                .bind(container_id)
                .fetch_one(&mut *tx)
                .await?;

        let now = OffsetDateTime::now_utc();
        let name = next_version_name(now, latest.as_deref())?;

        sqlx::query(
            "INSERT INTO versions (name, container_id, is_published, created_at) VALUES ($1, $2, FALSE, $3)",
        )
        .bind(name.as_str())
        .bind(container_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(name.into())
    }

    async fn get_latest_published_version_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<String> {
        let mut conn = self.pool.acquire().await?;
        let container_id = container_id(&mut conn, namespace, container).await?;

        sqlx::query_scalar(
            "SELECT name FROM versions WHERE container_id = $1 AND is_published ORDER BY name DESC LIMIT 1",
        )
        .bind(container_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            MetadataError::NotFound(format!(
                "published version of container '{namespace}/{container}'"
            ))
        })
    }

    async fn list_all_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        let mut conn = self.pool.acquire().await?;
        let container_id = container_id(&mut conn, namespace, container).await?;
        versions_by_filter(&mut conn, container_id, None).await
    }

    async fn list_published_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        let mut conn = self.pool.acquire().await?;
        let container_id = container_id(&mut conn, namespace, container).await?;
        versions_by_filter(&mut conn, container_id, Some(true)).await
    }

    async fn list_published_versions_by_container_and_page(
        &self,
        namespace: &str,
        container: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<Version>)> {
        let mut tx = begin_snapshot(&self.pool).await?;
        let container_id = container_id(&mut tx, namespace, container).await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM versions WHERE container_id = $1 AND is_published",
        )
        .bind(container_id)
        .fetch_one(&mut *tx)
        .await?;

        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM versions WHERE container_id = $1 AND is_published ORDER BY name LIMIT $2 OFFSET $3",
        )
        .bind(container_id)
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((to_u64(total), rows.into_iter().map(Version::from).collect()))
    }

    async fn list_unpublished_versions_by_container(
        &self,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<Vec<Version>> {
        let mut conn = self.pool.acquire().await?;
        let container_id = container_id(&mut conn, namespace, container).await?;
        versions_by_filter(&mut conn, container_id, Some(false)).await
    }

    async fn mark_version_published(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let id = version_id(&mut tx, namespace, container, version, false).await?;

        // The row may have been deleted by a collector holding its lock.
        let result = sqlx::query("UPDATE versions SET is_published = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!(
                "version '{namespace}/{container}/{version}'"
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()> {
        remove_version(&self.pool, namespace, container, version, false).await
    }

    async fn delete_unpublished_version(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
    ) -> MetadataResult<()> {
        remove_version(&self.pool, namespace, container, version, true).await
    }
}

#[async_trait]
impl ObjectRepo for PostgresStore {
    async fn create_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        checksum: &str,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let version_id = version_id(&mut tx, namespace, container, version, true).await?;
        let blob_id = blob_id_by_checksum(&mut tx, checksum).await?;
        let now = OffsetDateTime::now_utc();

        sqlx::query(
            "INSERT INTO object_keys (key, created_at) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let key_id: i64 = sqlx::query_scalar("SELECT id FROM object_keys WHERE key = $1")
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO objects (version_id, key_id, blob_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (version_id, key_id) DO UPDATE SET blob_id = EXCLUDED.blob_id
            "#,
        )
        .bind(version_id)
        .bind(key_id)
        .bind(blob_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<(u64, Vec<String>)> {
        let mut tx = begin_snapshot(&self.pool).await?;
        let version_id = version_id(&mut tx, namespace, container, version, false).await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE version_id = $1")
            .bind(version_id)
            .fetch_one(&mut *tx)
            .await?;

        let keys = sqlx::query_scalar(
            r#"
            SELECT k.key FROM objects o
            JOIN object_keys k ON k.id = o.key_id
            WHERE o.version_id = $1
            ORDER BY k.key
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(version_id)
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((to_u64(total), keys))
    }

    async fn delete_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
    ) -> MetadataResult<()> {
        remove_objects(&self.pool, namespace, container, version, keys, false).await
    }

    async fn delete_unpublished_objects(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
    ) -> MetadataResult<()> {
        remove_objects(&self.pool, namespace, container, version, keys, true).await
    }

    async fn remap_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
        new_checksum: &str,
    ) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        let version_id = version_id(&mut tx, namespace, container, version, false).await?;
        let blob_id = blob_id_by_checksum(&mut tx, new_checksum).await?;

        let result = sqlx::query(
            "UPDATE objects SET blob_id = $1 WHERE version_id = $2 AND key_id IN (SELECT id FROM object_keys WHERE key = $3)",
        )
        .bind(blob_id)
        .bind(version_id)
        .bind(key)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!(
                "object '{key}' in '{namespace}/{container}/{version}'"
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl BlobRepo for PostgresStore {
    async fn create_blob(&self, checksum: &str, size: u64, mime_type: &str) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO blobs (checksum, size, mime_type, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(checksum)
        .bind(blob_size(size)?)
        .bind(mime_type)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_blob_key_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> MetadataResult<String> {
        Ok(self
            .get_blob_by_object(namespace, container, version, key)
            .await?
            .checksum)
    }

    async fn get_blob_by_object(
        &self,
        namespace: &str,
        container: &str,
        version: &str,
        key: &str,
    ) -> MetadataResult<Blob> {
        let row = sqlx::query_as::<_, BlobRow>(
            r#"
            SELECT b.* FROM objects o
            JOIN object_keys k ON k.id = o.key_id
            JOIN blobs b ON b.id = o.blob_id
            JOIN versions v ON v.id = o.version_id
            JOIN containers c ON c.id = v.container_id
            JOIN namespaces n ON n.id = c.namespace_id
            WHERE n.name = $1 AND c.name = $2 AND v.name = $3 AND k.key = $4
            "#,
        )
        .bind(namespace)
        .bind(container)
        .bind(version)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            MetadataError::NotFound(format!(
                "object '{key}' in '{namespace}/{container}/{version}'"
            ))
        })?;
        Ok(row.into())
    }

    async fn ensure_blob_key(&self, checksum: &str, size: u64) -> MetadataResult<()> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM blobs WHERE checksum = $1 AND size = $2")
                .bind(checksum)
                .bind(blob_size(size)?)
                .fetch_optional(&self.pool)
                .await?;
        match exists {
            Some(_) => Ok(()),
            None => Err(MetadataError::NotFound(format!(
                "blob '{checksum}' of {size} bytes"
            ))),
        }
    }

    async fn list_orphaned_blobs(
        &self,
        older_than: OffsetDateTime,
        limit: u64,
    ) -> MetadataResult<Vec<Blob>> {
        let rows = sqlx::query_as::<_, BlobRow>(
            r#"
            SELECT b.* FROM blobs b
            WHERE b.created_at < $1
              AND NOT EXISTS (SELECT 1 FROM objects o WHERE o.blob_id = b.id)
            ORDER BY b.created_at, b.id
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Blob::from).collect())
    }

    async fn delete_blob_if_orphaned(&self, checksum: &str, size: u64) -> MetadataResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM blobs b
            WHERE b.checksum = $1 AND b.size = $2
              AND NOT EXISTS (SELECT 1 FROM objects o WHERE o.blob_id = b.id)
            "#,
        )
        .bind(checksum)
        .bind(blob_size(size)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_orphaned_object_keys(&self) -> MetadataResult<u64> {
        let result = sqlx::query(
            "DELETE FROM object_keys k WHERE NOT EXISTS (SELECT 1 FROM objects o WHERE o.key_id = k.id)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StatsRepo for PostgresStore {
    async fn count_stats(&self) -> MetadataResult<Stats> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let namespaces_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM namespaces")
            .fetch_one(&mut *tx)
            .await?;
        let containers_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM containers")
            .fetch_one(&mut *tx)
            .await?;

        let versions = sqlx::query_as::<_, VersionsCountRow>(
            r#"
            SELECT n.name AS namespace, c.name AS container, v.is_published AS is_published,
                   COUNT(*) AS count
            FROM versions v
            JOIN containers c ON c.id = v.container_id
            JOIN namespaces n ON n.id = c.namespace_id
            GROUP BY n.name, c.name, v.is_published
            ORDER BY n.name, c.name, v.is_published
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let objects = sqlx::query_as::<_, VersionAggregateRow>(
            r#"
            SELECT n.name AS namespace, c.name AS container, v.name AS version,
                   v.is_published AS is_published, COUNT(*) AS value
            FROM objects o
            JOIN versions v ON v.id = o.version_id
            JOIN containers c ON c.id = v.container_id
            JOIN namespaces n ON n.id = c.namespace_id
            GROUP BY n.name, c.name, v.name, v.is_published
            ORDER BY n.name, c.name, v.name
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let raw_sizes = sqlx::query_as::<_, VersionAggregateRow>(
            r#"
            SELECT n.name AS namespace, c.name AS container, v.name AS version,
                   v.is_published AS is_published, SUM(b.size)::BIGINT AS value
            FROM objects o
            JOIN blobs b ON b.id = o.blob_id
            JOIN versions v ON v.id = o.version_id
            JOIN containers c ON c.id = v.container_id
            JOIN namespaces n ON n.id = c.namespace_id
            GROUP BY n.name, c.name, v.name, v.is_published
            ORDER BY n.name, c.name, v.name
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let blobs_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
            .fetch_one(&mut *tx)
            .await?;
        let effective_size: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(size), 0)::BIGINT FROM blobs")
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(Stats {
            namespaces_count: to_u64(namespaces_count),
            containers_count: to_u64(containers_count),
            versions_count: versions
                .into_iter()
                .map(|r| VersionsCount {
                    namespace: r.namespace,
                    container: r.container,
                    is_published: r.is_published,
                    count: to_u64(r.count),
                })
                .collect(),
            objects_count: objects
                .into_iter()
                .map(|r| ObjectsCount {
                    namespace: r.namespace,
                    container: r.container,
                    version: r.version,
                    is_published: r.is_published,
                    count: to_u64(r.value),
                })
                .collect(),
            blobs_count: to_u64(blobs_count),
            blobs_raw_size_bytes: raw_sizes
                .into_iter()
                .map(|r| BlobsRawSize {
                    namespace: r.namespace,
                    container: r.container,
                    version: r.version,
                    is_published: r.is_published,
                    size_bytes: to_u64(r.value),
                })
                .collect(),
            blobs_effective_size_bytes: to_u64(effective_size),
        })
    }
}
