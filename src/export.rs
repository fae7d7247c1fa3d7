//! 导出模块
//!
//! 把当前显示的图片写成本地 PNG 文件（`roomMatrix-<id>.png`），不发起网络请求。
//! 非 PNG 数据用 `image` 解码后重新编码为 PNG。

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::payload::ImagePayload;

const EXPORT_PREFIX: &str = "roomMatrix";

/// 导出文件名；没有项目 id 时使用 `design`。
pub fn export_file_name(project_id: Option<&str>) -> String {
    let id = project_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(sanitize_file_stem)
        .unwrap_or_else(|| "design".to_string());
    format!("{EXPORT_PREFIX}-{id}.png")
}

fn sanitize_file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// 导出目录：配置的导出目录 → 系统下载目录 → 数据目录。
pub fn resolve_export_dir(config: &AppConfig) -> Result<PathBuf, AppError> {
    if let Some(dir) = config.export_dir.as_deref().filter(|dir| !dir.is_empty()) {
        let path = PathBuf::from(dir);
        fs::create_dir_all(&path)
            .map_err(|e| AppError::Storage(format!("创建导出目录 '{}' 失败: {}", dir, e)))?;
        return Ok(path);
    }

    match dirs::download_dir() {
        Some(dir) => Ok(dir),
        None => config.resolve_data_dir(),
    }
}

/// 把图片写入 `dir`，返回文件路径。
pub fn export_image(image: &ImagePayload, project_id: Option<&str>, dir: &Path) -> Result<PathBuf, AppError> {
    let png_bytes = if image.mime_type() == "image/png" {
        image.bytes().to_vec()
    } else {
        log::debug!("🔄 导出前转码为 PNG - 原格式: {}", image.mime_type());
        let decoded = image::load_from_memory(image.bytes())
            .map_err(|e| AppError::Export(format!("解码图片失败: {}", e)))?;
        let mut buffer = Cursor::new(Vec::new());
        decoded
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| AppError::Export(format!("编码 PNG 失败: {}", e)))?;
        buffer.into_inner()
    };

    fs::create_dir_all(dir)
        .map_err(|e| AppError::Storage(format!("创建导出目录 '{}' 失败: {}", dir.display(), e)))?;
    let path = dir.join(export_file_name(project_id));
    fs::write(&path, png_bytes)?;

    log::info!("💾 图片已导出 - {}", path.display());
    Ok(path)
}
