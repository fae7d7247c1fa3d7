//! 可视化页面状态与纯决策逻辑
//!
//! 所有“是否要生成”的判断都落在 `VisualizerState::decide_generation` 上，
//! 编排器只负责在 `watch` 写锁内调用它，保证判断与置位是原子的。

use serde::Serialize;

use crate::compare::ComparisonView;
use crate::db::DesignItem;
use crate::payload::{ImagePayload, ImageRef};

/// 页面阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Uninitialized,
    Loading,
    Idle,
    Generating,
    Settled,
}

/// 一次周期的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleOutcome {
    /// 已有渲染图或缺少源图，未调用生成
    Skipped,
    /// 生成并保存成功
    Persisted,
    /// 生成成功但保存失败，仅本地显示
    Unsaved,
    /// 内联会话生成成功（不保存）
    Rendered,
    /// 服务未返回图片
    Empty,
    /// 生成过程出错
    Failed,
}

/// 生成判断结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationDecision {
    /// 仍在加载或尚未初始化
    NotReady,
    /// 本次加载已经尝试过
    AlreadyAttempted,
    MissingSource,
    /// 项目已有渲染图，直接显示
    MirrorExisting,
    Generate(ImageRef),
}

impl GenerationDecision {
    pub(super) fn changes_state(&self) -> bool {
        !matches!(self, Self::NotReady | Self::AlreadyAttempted)
    }
}

/// 对外发布的页面状态
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizerState {
    pub phase: Phase,
    /// 持久化会话的项目 id，内联会话为 `None`
    pub project_id: Option<String>,
    pub project: Option<DesignItem>,
    /// 当前显示的渲染图
    pub current_image: Option<ImagePayload>,
    /// 生成闸门：每次新加载只允许一次生成尝试
    pub has_attempted_generation: bool,
    pub last_outcome: Option<CycleOutcome>,
}

impl VisualizerState {
    pub(super) fn loading(project_id: String) -> Self {
        Self {
            phase: Phase::Loading,
            project_id: Some(project_id),
            ..Self::default()
        }
    }

    /// 加载结束：显示已有渲染图（没有则清空），闸门复位。
    pub(super) fn finish_loading(&mut self, project: Option<DesignItem>) {
        self.current_image = project.as_ref().and_then(|item| item.rendered_image.clone());
        self.project = project;
        self.has_attempted_generation = false;
        self.phase = Phase::Idle;
    }

    pub(super) fn settle(&mut self, phase: Phase, outcome: CycleOutcome) {
        self.phase = phase;
        self.last_outcome = Some(outcome);
    }

    /// 判断是否需要生成，并就地完成对应的状态迁移。
    pub fn decide_generation(&mut self) -> GenerationDecision {
        if matches!(self.phase, Phase::Uninitialized | Phase::Loading) {
            return GenerationDecision::NotReady;
        }
        if self.has_attempted_generation {
            return GenerationDecision::AlreadyAttempted;
        }

        let Some(project) = self.project.as_ref() else {
            self.settle(Phase::Settled, CycleOutcome::Skipped);
            return GenerationDecision::MissingSource;
        };
        let Some(source) = project.source_image.clone() else {
            self.settle(Phase::Settled, CycleOutcome::Skipped);
            return GenerationDecision::MissingSource;
        };

        if let Some(rendered) = project.rendered_image.clone() {
            self.current_image = Some(rendered);
            self.has_attempted_generation = true;
            self.settle(Phase::Settled, CycleOutcome::Skipped);
            return GenerationDecision::MirrorExisting;
        }

        self.has_attempted_generation = true;
        self.phase = Phase::Generating;
        GenerationDecision::Generate(source)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Loading | Phase::Generating)
    }

    pub fn source_image(&self) -> Option<&ImageRef> {
        self.project.as_ref().and_then(|item| item.source_image.as_ref())
    }

    /// 尚无渲染图时的占位图（源图）
    pub fn placeholder(&self) -> Option<&ImageRef> {
        match self.current_image {
            Some(_) => None,
            None => self.source_image(),
        }
    }

    /// 页面标题，未命名时回退为 `Residence <id>`
    pub fn title(&self) -> String {
        match (&self.project, &self.project_id) {
            (Some(project), _) => project.display_name(),
            (None, Some(id)) => format!("Residence {id}"),
            (None, None) => "Residence".to_string(),
        }
    }

    /// 分享链接：公开地址 → 渲染地址 → 当前图片 Data URL；没有可显示图片时为 `None`。
    pub fn share_link(&self) -> Option<String> {
        let current = self.current_image.as_ref()?;
        let project = self.project.as_ref();

        project
            .and_then(|item| item.public_path.as_deref())
            .or_else(|| project.and_then(|item| item.rendered_path.as_deref()))
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .map(str::to_string)
            .or_else(|| Some(current.to_data_url()))
    }

    pub fn comparison(&self) -> ComparisonView<'_> {
        ComparisonView::from_images(self.source_image(), self.current_image.as_ref())
    }
}

/// 生成成功后构造待保存的项目：只补默认值，不覆盖已有的所有者 / 可见性。
pub fn build_rendered_item(
    item: &DesignItem,
    rendered: ImagePayload,
    rendered_path: Option<String>,
    user_id: Option<&str>,
    now_millis: i64,
) -> DesignItem {
    DesignItem {
        rendered_image: Some(rendered),
        rendered_path,
        timestamp: now_millis,
        owner_id: item.owner_id.clone().or_else(|| user_id.map(str::to_string)),
        is_public: Some(item.is_public.unwrap_or(false)),
        ..item.clone()
    }
}
