//! Schema 初始化子模块
//!
//! ## 职责
//! - 创建/迁移 `projects` 表与索引
//! - 设置 SQLite 运行参数（WAL）
//!
//! ## 错误语义
//! - DDL 失败统一映射为 `AppError::Database`

use rusqlite::Connection;

use crate::error::AppError;

pub(super) const SCHEMA_VERSION: i64 = 2;

fn get_user_version(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("读取数据库版本失败: {}", e)))
}

fn set_user_version(conn: &Connection, version: i64) -> Result<(), AppError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| AppError::Database(format!("写入数据库版本失败: {}", e)))
}

fn create_projects_table(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT,
            source_image TEXT,
            rendered_image TEXT,
            rendered_path TEXT,
            public_path TEXT,
            owner_id TEXT,
            is_public INTEGER CHECK (is_public IS NULL OR is_public IN (0, 1)),
            timestamp INTEGER NOT NULL
        );"
    ).map_err(|e| AppError::Database(format!("创建项目表失败: {}", e)))
}

fn add_visibility_column(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "ALTER TABLE projects ADD COLUMN visibility TEXT NOT NULL DEFAULT 'private'
            CHECK (visibility IN ('private', 'public'));"
    ).map_err(|e| AppError::Database(format!("添加可见性字段失败: {}", e)))
}

fn create_project_indexes(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_projects_timestamp ON projects(timestamp DESC);
         CREATE INDEX IF NOT EXISTS idx_projects_owner_timestamp ON projects(owner_id, timestamp DESC);"
    ).map_err(|e| AppError::Database(format!("创建项目索引失败: {}", e)))
}

pub(super) fn initialize_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

    let mut version = get_user_version(conn)?;

    if version < 1 {
        create_projects_table(conn)?;
        set_user_version(conn, 1)?;
        version = 1;
    }

    if version < 2 {
        add_visibility_column(conn)?;
        set_user_version(conn, 2)?;
        version = 2;
    }

    create_project_indexes(conn)?;

    if version != SCHEMA_VERSION {
        return Err(AppError::Database(format!(
            "数据库版本不匹配: current={}, expected={}",
            version, SCHEMA_VERSION
        )));
    }

    Ok(())
}
