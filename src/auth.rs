//! 登录会话
//!
//! 上传需要已登录，保存渲染结果时用当前用户补全所有者。
//! 真正的身份服务由宿主提供，这里只定义接口和一个进程内实现。

use std::future::Future;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// 登录会话接口
pub trait AuthSession: Send + Sync {
    fn is_signed_in(&self) -> bool;
    fn user_id(&self) -> Option<String>;
    fn user_name(&self) -> Option<String>;
    fn sign_in(&self) -> impl Future<Output = Result<(), AppError>> + Send;
    fn sign_out(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// 进程内会话：`sign_in` 时登录为预设用户
pub struct LocalSession {
    profile: UserProfile,
    current: Mutex<Option<UserProfile>>,
}

impl LocalSession {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<UserProfile> {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_current(&self, value: Option<UserProfile>) -> Result<(), AppError> {
        let mut guard = self
            .current
            .lock()
            .map_err(|e| AppError::Auth(format!("会话锁已中毒: {}", e)))?;
        *guard = value;
        Ok(())
    }
}

impl AuthSession for LocalSession {
    fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    fn user_id(&self) -> Option<String> {
        self.current().map(|profile| profile.user_id)
    }

    fn user_name(&self) -> Option<String> {
        self.current().and_then(|profile| profile.user_name)
    }

    async fn sign_in(&self) -> Result<(), AppError> {
        self.set_current(Some(self.profile.clone()))?;
        log::info!("🔐 已登录 - {}", self.profile.user_id);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.set_current(None)?;
        log::info!("🔓 已登出");
        Ok(())
    }
}

/// 登录 / 登出切换；失败只记录日志。
pub async fn toggle_auth<S: AuthSession>(session: &S) {
    if session.is_signed_in() {
        if let Err(err) = session.sign_out().await {
            log::error!("❌ 登出失败: {}", err);
        }
        return;
    }

    if let Err(err) = session.sign_in().await {
        log::error!("❌ 登录失败: {}", err);
    }
}

/// 导航栏问候语，未登录时为 `None`
pub fn greeting<S: AuthSession>(session: &S) -> Option<String> {
    if !session.is_signed_in() {
        return None;
    }
    Some(match session.user_name() {
        Some(name) if !name.trim().is_empty() => format!("Hi, {}", name),
        _ => "Signed In".to_string(),
    })
}
