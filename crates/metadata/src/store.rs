//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{BlobRepo, ContainerRepo, NamespaceRepo, ObjectRepo, StatsRepo, VersionRepo};
use async_trait::async_trait;
use depot_core::DEFAULT_NAMESPACE;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    NamespaceRepo + ContainerRepo + VersionRepo + ObjectRepo + BlobRepo + StatsRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store at `path`. `":memory:"` opens a private in-memory database.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // A single connection serializes writers and keeps an in-memory database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store opened");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;

        sqlx::query("INSERT INTO namespaces (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
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

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use depot_core::models::{BlobsRawSize, ObjectsCount, VersionsCount};
    use depot_core::{Blob, Container, Stats, Version, next_version_name};
    use sqlx::SqliteConnection;
    use time::Duration as TimeDuration;

    async fn namespace_id(conn: &mut SqliteConnection, name: &str) -> MetadataResult<i64> {
        sqlx::query_scalar("SELECT id FROM namespaces WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("namespace '{name}'")))
    }

    async fn container_id(
        conn: &mut SqliteConnection,
        namespace: &str,
        container: &str,
    ) -> MetadataResult<i64> {
        sqlx::query_scalar(
            r#"
            SELECT c.id FROM containers c
            JOIN namespaces n ON n.id = c.namespace_id
            WHERE n.name = ? AND c.name = ?
            "#,
        )
        .bind(namespace)
        .bind(container)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::NotFound(format!("container '{namespace}/{container}'")))
    }

    async fn version_id(
        conn: &mut SqliteConnection,
        namespace: &str,
        container: &str,
        version: &str,
        unpublished_only: bool,
    ) -> MetadataResult<i64> {
        let container_id = container_id(conn, namespace, container).await?;
        let sql = if unpublished_only {
            "SELECT id FROM versions WHERE container_id = ? AND name = ? AND is_published = 0"
        } else {
            "SELECT id FROM versions WHERE container_id = ? AND name = ?"
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

    async fn blob_id_by_checksum(conn: &mut SqliteConnection, checksum: &str) -> MetadataResult<i64> {
        sqlx::query_scalar("SELECT id FROM blobs WHERE checksum = ? ORDER BY id LIMIT 1")
            .bind(checksum)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("blob '{checksum}'")))
    }

    async fn versions_by_filter(
        conn: &mut SqliteConnection,
        container_id: i64,
        published: Option<bool>,
    ) -> MetadataResult<Vec<Version>> {
        let rows = match published {
            Some(published) => {
                sqlx::query_as::<_, VersionRow>(
                    "SELECT * FROM versions WHERE container_id = ? AND is_published = ? ORDER BY name",
                )
                .bind(container_id)
                .bind(published)
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query_as::<_, VersionRow>(
                    "SELECT * FROM versions WHERE container_id = ? ORDER BY name",
                )
                .bind(container_id)
                .fetch_all(&mut *conn)
                .await?
            }
        };
        Ok(rows.into_iter().map(Version::from).collect())
    }

    async fn remove_version(
        pool: &Pool<Sqlite>,
        namespace: &str,
        container: &str,
        version: &str,
        unpublished_only: bool,
    ) -> MetadataResult<()> {
        let mut tx = pool.begin().await?;
        let id = version_id(&mut tx, namespace, container, version, unpublished_only).await?;

        sqlx::query("DELETE FROM objects WHERE version_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM versions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_objects(
        pool: &Pool<Sqlite>,
        namespace: &str,
        container: &str,
        version: &str,
        keys: &[String],
        unpublished_only: bool,
    ) -> MetadataResult<()> {
        let mut tx = pool.begin().await?;
        let version_id =
            version_id(&mut tx, namespace, container, version, unpublished_only).await?;

        for key in keys {
            sqlx::query(
                "DELETE FROM objects WHERE version_id = ? AND key_id IN (SELECT id FROM object_keys WHERE key = ?)",
            )
            .bind(version_id)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[async_trait]
    impl NamespaceRepo for SqliteStore {
        async fn create_namespace(&self, name: &str) -> MetadataResult<()> {
            sqlx::query("INSERT INTO namespaces (name, created_at) VALUES (?, ?)")
                .bind(name)
                .bind(OffsetDateTime::now_utc())
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn rename_namespace(&self, old_name: &str, new_name: &str) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE namespaces SET name = ? WHERE name = ?")
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
            let id = namespace_id(&mut tx, name).await?;

            let containers: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE namespace_id = ?")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            if containers > 0 {
                return Err(MetadataError::Conflict(format!(
                    "namespace '{name}' still holds {containers} containers"
                )));
            }

            sqlx::query("DELETE FROM namespaces WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerRepo for SqliteStore {
        async fn create_container(
            &self,
            namespace: &str,
            name: &str,
            versions_ttl: TimeDuration,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;
            let namespace_id = namespace_id(&mut tx, namespace).await?;

            sqlx::query(
                "INSERT INTO containers (name, namespace_id, created_at, versions_ttl_seconds) VALUES (?, ?, ?, ?)",
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

            sqlx::query("UPDATE containers SET name = ?, namespace_id = ? WHERE id = ?")
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
            versions_ttl: TimeDuration,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;
            let id = container_id(&mut tx, namespace, name).await?;

            sqlx::query("UPDATE containers SET versions_ttl_seconds = ? WHERE id = ?")
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
                "SELECT * FROM containers WHERE namespace_id = ? ORDER BY name",
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
            let mut tx = self.pool.begin().await?;
            let namespace_id = namespace_id(&mut tx, namespace).await?;

            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE namespace_id = ?")
                    .bind(namespace_id)
                    .fetch_one(&mut *tx)
                    .await?;

            let rows = sqlx::query_as::<_, ContainerRow>(
                "SELECT * FROM containers WHERE namespace_id = ? ORDER BY name LIMIT ? OFFSET ?",
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
                "DELETE FROM objects WHERE version_id IN (SELECT id FROM versions WHERE container_id = ?)",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM versions WHERE container_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM containers WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl VersionRepo for SqliteStore {
        async fn create_version(&self, namespace: &str, container: &str) -> MetadataResult<String> {
            let mut tx = self.pool.begin().await?;
            let container_id = container_id(&mut tx, namespace, container).await?;

            let latest: Option<String> =
                sqlx::query_scalar("SELECT MAX(name) FROM versions WHERE container_id = ?")
                    .bind(container_id)
                    .fetch_one(&mut *tx)
                    .await?;

            let now = OffsetDateTime::now_utc();
            let name = next_version_name(now, latest.as_deref())?;

            sqlx::query(
                "INSERT INTO versions (name, container_id, is_published, created_at) VALUES (?, ?, 0, ?)",
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
                "SELECT name FROM versions WHERE container_id = ? AND is_published = 1 ORDER BY name DESC LIMIT 1",
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
            let mut tx = self.pool.begin().await?;
            let container_id = container_id(&mut tx, namespace, container).await?;

            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM versions WHERE container_id = ? AND is_published = 1",
            )
            .bind(container_id)
            .fetch_one(&mut *tx)
            .await?;

            let rows = sqlx::query_as::<_, VersionRow>(
                "SELECT * FROM versions WHERE container_id = ? AND is_published = 1 ORDER BY name LIMIT ? OFFSET ?",
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

            sqlx::query("UPDATE versions SET is_published = 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

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
    impl ObjectRepo for SqliteStore {
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
                "INSERT INTO object_keys (key, created_at) VALUES (?, ?) ON CONFLICT(key) DO NOTHING",
            )
            .bind(key)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            let key_id: i64 = sqlx::query_scalar("SELECT id FROM object_keys WHERE key = ?")
                .bind(key)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO objects (version_id, key_id, blob_id, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(version_id, key_id) DO UPDATE SET blob_id = excluded.blob_id
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
            let mut tx = self.pool.begin().await?;
            let version_id = version_id(&mut tx, namespace, container, version, false).await?;

            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE version_id = ?")
                .bind(version_id)
                .fetch_one(&mut *tx)
                .await?;

            let keys = sqlx::query_scalar(
                r#"
                SELECT k.key FROM objects o
                JOIN object_keys k ON k.id = o.key_id
                WHERE o.version_id = ?
                ORDER BY k.key
                LIMIT ? OFFSET ?
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
                "UPDATE objects SET blob_id = ? WHERE version_id = ? AND key_id IN (SELECT id FROM object_keys WHERE key = ?)",
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
    impl BlobRepo for SqliteStore {
        async fn create_blob(
            &self,
            checksum: &str,
            size: u64,
            mime_type: &str,
        ) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO blobs (checksum, size, mime_type, created_at) VALUES (?, ?, ?, ?)",
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
                WHERE n.name = ? AND c.name = ? AND v.name = ? AND k.key = ?
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
                sqlx::query_scalar("SELECT id FROM blobs WHERE checksum = ? AND size = ?")
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
            // Timestamps are RFC 3339 text with a trimmed fraction, which does
            // not sort lexicographically within a second.
            let rows = sqlx::query_as::<_, BlobRow>(
                r#"
                SELECT b.* FROM blobs b
                WHERE julianday(b.created_at) < julianday(?)
                  AND NOT EXISTS (SELECT 1 FROM objects o WHERE o.blob_id = b.id)
                ORDER BY julianday(b.created_at), b.id
                LIMIT ?
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
                DELETE FROM blobs
                WHERE checksum = ? AND size = ?
                  AND NOT EXISTS (SELECT 1 FROM objects o WHERE o.blob_id = blobs.id)
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
                "DELETE FROM object_keys WHERE NOT EXISTS (SELECT 1 FROM objects o WHERE o.key_id = object_keys.id)",
            )
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl StatsRepo for SqliteStore {
        async fn count_stats(&self) -> MetadataResult<Stats> {
            // One transaction gives every aggregate the same snapshot.
            let mut tx = self.pool.begin().await?;

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
                       v.is_published AS is_published, SUM(b.size) AS value
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
            let effective_size: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM blobs")
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
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS namespaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS containers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    namespace_id INTEGER NOT NULL REFERENCES namespaces(id) ON DELETE RESTRICT,
    created_at TEXT NOT NULL,
    versions_ttl_seconds INTEGER NOT NULL DEFAULT -1,
    UNIQUE (namespace_id, name)
);

CREATE TABLE IF NOT EXISTS versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    container_id INTEGER NOT NULL REFERENCES containers(id) ON DELETE CASCADE,
    is_published INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (container_id, name)
);
CREATE INDEX IF NOT EXISTS idx_versions_container_published ON versions(container_id, is_published);

CREATE TABLE IF NOT EXISTS object_keys (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS blobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    checksum TEXT NOT NULL,
    size INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (checksum, size)
);
CREATE INDEX IF NOT EXISTS idx_blobs_checksum ON blobs(checksum);
CREATE INDEX IF NOT EXISTS idx_blobs_created_at ON blobs(created_at);

CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version_id INTEGER NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
    key_id INTEGER NOT NULL REFERENCES object_keys(id) ON DELETE RESTRICT,
    blob_id INTEGER NOT NULL REFERENCES blobs(id) ON DELETE RESTRICT,
    created_at TEXT NOT NULL,
    UNIQUE (version_id, key_id)
);
CREATE INDEX IF NOT EXISTS idx_objects_blob_id ON objects(blob_id);
CREATE INDEX IF NOT EXISTS idx_objects_key_id ON objects(key_id);
"#;
