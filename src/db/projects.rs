//! 项目读写子模块
//!
//! ## 职责
//! - 按 id 读取项目、保存项目（按 id upsert）、按所有者列出项目
//!
//! ## 输入/输出
//! - 图片字段以字符串落库：内联数据存 Data URL，远程图片存地址
//! - 读取时在 `ProjectRow -> DesignItem` 处一次性解析，非法数据映射为 `AppError::Database`

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{schema, DesignItem, ProjectRepository, Visibility};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::payload::{ImagePayload, ImageRef};

const SELECT_COLUMNS: &str = "id, name, source_image, rendered_image, rendered_path, public_path, owner_id, is_public, timestamp";

/// 基于 SQLite 的项目仓库，克隆后共享同一连接
#[derive(Clone)]
pub struct SqliteProjectRepository {
    conn: Arc<Mutex<Connection>>,
}

/// 数据库中的原始行
struct ProjectRow {
    id: String,
    name: Option<String>,
    source_image: Option<String>,
    rendered_image: Option<String>,
    rendered_path: Option<String>,
    public_path: Option<String>,
    owner_id: Option<String>,
    is_public: Option<i32>,
    timestamp: i64,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            source_image: row.get(2)?,
            rendered_image: row.get(3)?,
            rendered_path: row.get(4)?,
            public_path: row.get(5)?,
            owner_id: row.get(6)?,
            is_public: row.get(7)?,
            timestamp: row.get(8)?,
        })
    }
}

impl TryFrom<ProjectRow> for DesignItem {
    type Error = AppError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let source_image = row
            .source_image
            .as_deref()
            .map(ImageRef::parse)
            .transpose()
            .map_err(|e| AppError::Database(format!("项目 {} 的源图数据损坏: {}", row.id, e)))?;
        let rendered_image = row
            .rendered_image
            .as_deref()
            .map(ImagePayload::parse_data_url)
            .transpose()
            .map_err(|e| AppError::Database(format!("项目 {} 的渲染数据损坏: {}", row.id, e)))?;

        Ok(DesignItem {
            id: row.id,
            name: row.name,
            source_image,
            rendered_image,
            rendered_path: row.rendered_path,
            public_path: row.public_path,
            owner_id: row.owner_id,
            is_public: row.is_public.map(|flag| flag != 0),
            timestamp: row.timestamp,
        })
    }
}

impl SqliteProjectRepository {
    /// 打开（或创建）数据库文件并初始化 Schema
    pub fn open(path: &Path) -> Result<Self, AppError> {
        log::info!("数据库路径: {}", path.display());
        let conn = Connection::open(path)
            .map_err(|e| AppError::Database(format!("打开数据库失败: {}", e)))?;
        Self::with_connection(conn)
    }

    /// 使用配置中的数据目录
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let db_path = config.resolve_db_path()?;
        Self::open(&db_path)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Database(format!("创建内存数据库失败: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        schema::initialize_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<T>(&self, op: impl FnOnce(&Connection) -> Result<T, AppError>) -> Result<T, AppError> {
        let conn = self.conn.lock().map_err(|e| {
            AppError::Database(format!("获取数据库锁失败: {}", e))
        })?;
        op(&conn)
    }

    /// 按 id 读取项目
    pub fn find(&self, id: &str) -> Result<Option<DesignItem>, AppError> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                ProjectRow::from_row,
            )
            .optional()
            .map_err(|e| AppError::Database(format!("查询项目失败: {}", e)))
        })?;

        row.map(DesignItem::try_from).transpose()
    }

    /// 新建或覆盖项目，返回重新读取的持久化版本
    pub fn save(&self, item: &DesignItem, visibility: Visibility) -> Result<DesignItem, AppError> {
        let source_image = item.source_image.as_ref().map(ImageRef::to_link);
        let rendered_image = item.rendered_image.as_ref().map(ImagePayload::to_data_url);
        let is_public = item.is_public.map(i32::from);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (
                    id, name, source_image, rendered_image, rendered_path, public_path,
                    owner_id, is_public, visibility, timestamp
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    source_image = excluded.source_image,
                    rendered_image = excluded.rendered_image,
                    rendered_path = excluded.rendered_path,
                    public_path = excluded.public_path,
                    owner_id = excluded.owner_id,
                    is_public = excluded.is_public,
                    visibility = excluded.visibility,
                    timestamp = excluded.timestamp",
                params![
                    item.id,
                    item.name,
                    source_image,
                    rendered_image,
                    item.rendered_path,
                    item.public_path,
                    item.owner_id,
                    is_public,
                    visibility.as_str(),
                    item.timestamp,
                ],
            )
            .map_err(|e| AppError::Database(format!("保存项目失败: {}", e)))?;
            Ok(())
        })?;

        self.find(&item.id)?
            .ok_or_else(|| AppError::Database(format!("保存后未能读回项目 {}", item.id)))
    }

    /// 列出项目（最新优先），指定所有者时仅返回其项目
    pub fn list_projects(&self, owner_id: Option<&str>) -> Result<Vec<DesignItem>, AppError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM projects
                     WHERE ?1 IS NULL OR owner_id = ?1
                     ORDER BY timestamp DESC"
                ))
                .map_err(|e| AppError::Database(format!("准备项目列表查询失败: {}", e)))?;
            stmt.query_map(params![owner_id], ProjectRow::from_row)
                .map_err(|e| AppError::Database(format!("查询项目列表失败: {}", e)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Database(format!("读取项目列表失败: {}", e)))
        })?;

        rows.into_iter().map(DesignItem::try_from).collect()
    }

    /// 读取项目保存时使用的可见性
    pub fn visibility_of(&self, id: &str) -> Result<Option<Visibility>, AppError> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row("SELECT visibility FROM projects WHERE id = ?1", params![id], |row| row.get(0))
                .optional()
                .map_err(|e| AppError::Database(format!("查询项目可见性失败: {}", e)))
        })?;
        Ok(raw.as_deref().and_then(Visibility::parse))
    }
}

impl SqliteProjectRepository {
    /// rusqlite 调用是阻塞的，放到 `spawn_blocking` 中执行
    async fn run_blocking<T, F>(&self, op: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, AppError> + Send + 'static,
    {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || op(&repo))
            .await
            .map_err(|e| AppError::Database(format!("数据库任务异常结束: {}", e)))?
    }
}

impl ProjectRepository for SqliteProjectRepository {
    async fn get_project_by_id(&self, id: &str) -> Result<Option<DesignItem>, AppError> {
        let id = id.to_string();
        self.run_blocking(move |repo| repo.find(&id)).await
    }

    async fn create_project(&self, item: DesignItem, visibility: Visibility) -> Result<DesignItem, AppError> {
        self.run_blocking(move |repo| repo.save(&item, visibility)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 12] = [137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];

    fn sample_item(id: &str, owner: Option<&str>, timestamp: i64) -> DesignItem {
        let source = ImagePayload::new("image/png", PNG_SIGNATURE.to_vec()).expect("payload");
        let mut item = DesignItem::from_upload(source, Some(format!("plan {id}")), owner.map(str::to_string));
        item.id = id.to_string();
        item.timestamp = timestamp;
        item
    }

    #[test]
    fn save_then_find_returns_same_item() {
        let repo = SqliteProjectRepository::open_in_memory().expect("open repo");
        let mut item = sample_item("42", Some("user-1"), 10);
        item.rendered_image = Some(ImagePayload::new("image/png", PNG_SIGNATURE.to_vec()).expect("render"));
        item.rendered_path = Some("https://cdn.example.com/42.png".to_string());
        item.is_public = Some(false);

        let saved = repo.save(&item, Visibility::Private).expect("save item");
        assert_eq!(saved, item);

        let found = repo.find("42").expect("find item").expect("item exists");
        assert_eq!(found, item);
        assert_eq!(repo.visibility_of("42").expect("visibility"), Some(Visibility::Private));
    }

    #[test]
    fn find_missing_returns_none() {
        let repo = SqliteProjectRepository::open_in_memory().expect("open repo");
        assert!(repo.find("missing").expect("query").is_none());
    }

    #[test]
    fn save_overwrites_existing_row() {
        let repo = SqliteProjectRepository::open_in_memory().expect("open repo");
        let mut item = sample_item("7", None, 1);
        repo.save(&item, Visibility::Private).expect("first save");

        item.rendered_image = Some(ImagePayload::new("image/png", PNG_SIGNATURE.to_vec()).expect("render"));
        item.timestamp = 2;
        repo.save(&item, Visibility::Public).expect("second save");

        let all = repo.list_projects(None).expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].timestamp, 2);
        assert!(all[0].rendered_image.is_some());
        assert_eq!(repo.visibility_of("7").expect("visibility"), Some(Visibility::Public));
    }

    #[test]
    fn list_projects_filters_by_owner_newest_first() {
        let repo = SqliteProjectRepository::open_in_memory().expect("open repo");
        repo.save(&sample_item("a", Some("u1"), 1), Visibility::Private).expect("save a");
        repo.save(&sample_item("b", Some("u2"), 2), Visibility::Private).expect("save b");
        repo.save(&sample_item("c", Some("u1"), 3), Visibility::Private).expect("save c");

        let mine: Vec<String> = repo
            .list_projects(Some("u1"))
            .expect("list mine")
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(mine, vec!["c".to_string(), "a".to_string()]);

        assert_eq!(repo.list_projects(None).expect("list all").len(), 3);
    }

    #[test]
    fn corrupted_image_column_is_reported() {
        let repo = SqliteProjectRepository::open_in_memory().expect("open repo");
        repo.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (id, rendered_image, timestamp) VALUES ('bad', 'not-a-data-url', 1)",
                [],
            )
            .map_err(|e| AppError::Database(e.to_string()))?;
            Ok(())
        })
        .expect("insert corrupted row");

        assert!(matches!(repo.find("bad"), Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn repository_trait_delegates_to_sqlite() {
        let repo = SqliteProjectRepository::open_in_memory().expect("open repo");
        let item = sample_item("trait", None, 5);

        let saved = repo.create_project(item.clone(), Visibility::Private).await.expect("create");
        assert_eq!(saved, item);

        let loaded = repo.get_project_by_id("trait").await.expect("get");
        assert_eq!(loaded, Some(item));
    }

    #[tokio::test]
    async fn trait_calls_do_not_block_the_runtime_thread() {
        let repo = SqliteProjectRepository::open_in_memory().expect("open repo");
        repo.save(&sample_item("busy", None, 1), Visibility::Private).expect("seed");

        // 单线程运行时下持有连接锁：若查询在工作线程上阻塞，下面的 sleep 永远不会返回
        let guard = repo.conn.lock().expect("lock connection");
        let pending = tokio::spawn({
            let repo = repo.clone();
            async move { repo.get_project_by_id("busy").await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        drop(guard);
        let found = pending.await.expect("join").expect("query");
        assert_eq!(found.map(|item| item.id), Some("busy".to_string()));
    }
}
