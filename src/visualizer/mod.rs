//! # 渲染编排模块（核心状态机）
//!
//! ## 设计思路
//!
//! 一个 `RenderOrchestrator` 对应一次页面访问中的一个设计项目：
//! 加载 → 判断是否需要生成（每次加载最多一次）→ 生成 → 保存 → 同步显示状态。
//!
//! ```text
//! Uninitialized ─load─▶ Loading ─▶ Idle ─decide─▶ Generating ─▶ Settled / Idle
//!                                        └─────skip─────────────▶ Settled
//! ```
//!
//! ## 实现思路
//!
//! - 状态通过 `tokio::sync::watch` 发布；所有写入都在写锁内先检查周期的存活标志，
//!   已被取消的周期（重新加载、销毁）不会再改动状态。
//! - 生成闸门 `has_attempted_generation` 是状态的一部分，判断与置位在同一次写入中完成。
//! - 生成成功后先显示（乐观显示），再保存；保存结果只会细化显示，不会回退。
//! - 所有失败都在这里记录日志后吞掉，不向调用方抛出。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::{DesignItem, ProjectRepository, Visibility};
use crate::payload::{ImagePayload, ImageRef};
use crate::render::RenderGateway;

mod state;

pub use state::{build_rendered_item, CycleOutcome, GenerationDecision, Phase, VisualizerState};

/// 一个正在运行的周期任务；`Drop` 即取消
struct Cycle {
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Drop for Cycle {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

/// 周期任务持有的上下文
struct CycleContext<R, G> {
    repository: Arc<R>,
    gateway: Arc<G>,
    user_id: Option<String>,
    state: Arc<watch::Sender<VisualizerState>>,
    alive: Arc<AtomicBool>,
    persist: bool,
}

impl<R, G> CycleContext<R, G> {
    /// 周期仍存活时修改状态，返回是否已应用。
    fn apply(&self, update: impl FnOnce(&mut VisualizerState)) -> bool {
        self.state.send_if_modified(|state| {
            if !self.alive.load(Ordering::SeqCst) {
                return false;
            }
            update(state);
            true
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// 渲染编排器
pub struct RenderOrchestrator<R, G> {
    repository: Arc<R>,
    gateway: Arc<G>,
    user_id: Option<String>,
    state: Arc<watch::Sender<VisualizerState>>,
    cycle: Option<Cycle>,
    /// 当前会话是否写回仓库（内联会话不写）
    persist: bool,
}

impl<R: ProjectRepository, G: RenderGateway> RenderOrchestrator<R, G> {
    pub fn new(repository: Arc<R>, gateway: Arc<G>, user_id: Option<String>) -> Self {
        let (sender, _) = watch::channel(VisualizerState::default());
        Self {
            repository,
            gateway,
            user_id,
            state: Arc::new(sender),
            cycle: None,
            persist: true,
        }
    }

    /// 登录状态变化时更新当前用户，只影响之后的保存。
    pub fn set_user_id(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
    }

    /// 按 id 加载项目并在需要时生成渲染图。
    ///
    /// 与当前已加载的 id 相同时不做任何事，返回 `false`。必须在 tokio 运行时内调用。
    pub fn load(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        let already_loaded = self.state.borrow().project_id.as_deref() == Some(id.as_str());
        if already_loaded {
            log::debug!("项目已加载，跳过 - id: {}", id);
            return false;
        }

        self.cycle = None;
        self.persist = true;
        self.state.send_replace(VisualizerState::loading(id.clone()));

        log::info!("🧱 加载项目 - id: {}", id);
        self.spawn_cycle(|ctx| run_load_cycle(ctx, id));
        true
    }

    /// 直接使用内存中的源图 / 渲染图打开会话，不读写仓库。
    pub fn open_inline(&mut self, source: ImageRef, rendered: Option<ImagePayload>) {
        self.cycle = None;
        self.persist = false;

        let project = DesignItem {
            id: uuid::Uuid::new_v4().to_string(),
            name: None,
            source_image: Some(source),
            rendered_image: rendered,
            rendered_path: None,
            public_path: None,
            owner_id: self.user_id.clone(),
            is_public: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        log::info!("🧱 打开内联会话");
        let mut state = VisualizerState::default();
        state.finish_loading(Some(project));
        let decision = state.decide_generation();
        self.state.send_replace(state);
        self.start_decided(decision);
    }

    /// 重新执行生成判断；闸门已置位时什么也不做。返回是否启动了生成。
    pub fn reevaluate(&mut self) -> bool {
        let mut decision = GenerationDecision::NotReady;
        self.state.send_if_modified(|state| {
            decision = state.decide_generation();
            decision.changes_state()
        });
        self.start_decided(decision)
    }

    /// 等待当前周期结束（加载、生成、保存都已完成）。
    pub async fn until_settled(&mut self) {
        if let Some(cycle) = self.cycle.as_mut() {
            if !cycle.task.is_finished() {
                if let Err(err) = (&mut cycle.task).await {
                    if !err.is_cancelled() {
                        log::error!("❌ 渲染周期异常结束: {}", err);
                    }
                }
            }
        }
    }

    /// 取消正在进行的周期，之后状态不再变化。
    pub fn teardown(&mut self) {
        if self.cycle.take().is_some() {
            log::debug!("渲染周期已取消");
        }
    }

    pub fn snapshot(&self) -> VisualizerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VisualizerState> {
        self.state.subscribe()
    }

    fn start_decided(&mut self, decision: GenerationDecision) -> bool {
        match decision {
            GenerationDecision::Generate(source) => {
                self.spawn_cycle(|ctx| run_generation(ctx, source));
                true
            }
            GenerationDecision::MirrorExisting => {
                log::info!("🖼️ 项目已有渲染图，直接显示");
                false
            }
            GenerationDecision::MissingSource => {
                log::warn!("⚠️ 项目缺少源图，跳过生成");
                false
            }
            GenerationDecision::NotReady | GenerationDecision::AlreadyAttempted => false,
        }
    }

    fn spawn_cycle<F, Fut>(&mut self, run: F)
    where
        F: FnOnce(CycleContext<R, G>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cycle = None;
        let alive = Arc::new(AtomicBool::new(true));
        let ctx = CycleContext {
            repository: Arc::clone(&self.repository),
            gateway: Arc::clone(&self.gateway),
            user_id: self.user_id.clone(),
            state: Arc::clone(&self.state),
            alive: Arc::clone(&alive),
            persist: self.persist,
        };
        let task = tokio::spawn(run(ctx));
        self.cycle = Some(Cycle { alive, task });
    }
}

impl<R, G> Drop for RenderOrchestrator<R, G> {
    fn drop(&mut self) {
        self.cycle = None;
    }
}

async fn run_load_cycle<R: ProjectRepository, G: RenderGateway>(ctx: CycleContext<R, G>, id: String) {
    let project = match ctx.repository.get_project_by_id(&id).await {
        Ok(Some(project)) => Some(project),
        Ok(None) => {
            log::warn!("⚠️ 项目不存在 - id: {}", id);
            None
        }
        Err(err) => {
            log::warn!("⚠️ 读取项目失败，按不存在处理 - id: {}: {}", id, err);
            None
        }
    };

    let mut decision = GenerationDecision::NotReady;
    let applied = ctx.apply(|state| {
        state.finish_loading(project);
        decision = state.decide_generation();
    });
    if !applied {
        log::debug!("加载结果已过期，丢弃 - id: {}", id);
        return;
    }

    match decision {
        GenerationDecision::Generate(source) => run_generation(ctx, source).await,
        GenerationDecision::MirrorExisting => log::info!("🖼️ 项目已有渲染图，直接显示 - id: {}", id),
        GenerationDecision::MissingSource => log::warn!("⚠️ 项目缺少源图，跳过生成 - id: {}", id),
        GenerationDecision::NotReady | GenerationDecision::AlreadyAttempted => {}
    }
}

async fn run_generation<R: ProjectRepository, G: RenderGateway>(ctx: CycleContext<R, G>, source: ImageRef) {
    log::info!("🎨 开始生成 3D 视图 - 源图: {}", source);

    let output = match ctx.gateway.generate_3d_view(&source).await {
        Ok(output) => output,
        Err(err) => {
            log::error!("❌ 生成失败: {}", err);
            ctx.apply(|state| state.settle(Phase::Idle, CycleOutcome::Failed));
            return;
        }
    };

    let Some(rendered) = output.rendered_image else {
        log::warn!("⚠️ 生成未返回图片，保持当前显示");
        ctx.apply(|state| state.settle(Phase::Idle, CycleOutcome::Empty));
        return;
    };

    let mut base = None;
    let shown = ctx.apply(|state| {
        state.current_image = Some(rendered.clone());
        base = state.project.clone();
    });
    if !shown {
        return;
    }
    let Some(base) = base else {
        log::error!("❌ 生成完成但项目已丢失");
        ctx.apply(|state| state.settle(Phase::Idle, CycleOutcome::Failed));
        return;
    };

    let now = chrono::Utc::now().timestamp_millis();
    let updated = build_rendered_item(&base, rendered.clone(), output.rendered_path, ctx.user_id.as_deref(), now);

    if !ctx.persist {
        log::info!("✅ 生成完成（内联会话，不保存）");
        ctx.apply(|state| {
            state.project = Some(updated);
            state.settle(Phase::Settled, CycleOutcome::Rendered);
        });
        return;
    }

    let project_id = updated.id.clone();
    let saved = ctx.repository.create_project(updated, Visibility::Private).await;
    if !ctx.is_alive() {
        return;
    }

    match saved {
        Ok(saved) => {
            log::info!("💾 渲染结果已保存 - id: {}", project_id);
            ctx.apply(|state| {
                state.current_image = saved.rendered_image.clone().or(Some(rendered));
                state.project = Some(saved);
                state.settle(Phase::Settled, CycleOutcome::Persisted);
            });
        }
        Err(err) => {
            log::warn!("⚠️ 保存渲染结果失败，仅本地显示 - id: {}: {}", project_id, err);
            ctx.apply(|state| state.settle(Phase::Settled, CycleOutcome::Unsaved));
        }
    }
}
