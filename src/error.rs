use std::fmt;

use crate::session::Role;

/// 应用程序错误类型
///
/// 两层错误策略：
/// - 探测层（元素找不到）不走这里，返回 `Option` / `bool` 哨兵值，由调用方决定下一个策略
/// - 编排层（登录、导航、提取）抛出本类型，由每个角色的重试点捕获一次
#[derive(Debug)]
pub enum AppError {
    /// 浏览器相关错误
    Browser(BrowserError),
    /// 登录失败（对该角色是致命错误）
    Login { role: Role, reason: String },
    /// 会话失效（可恢复：重新登录后重试同一个调用）
    SessionExpired { role: Role },
    /// 导航失败（该角色当前步骤致命，外层策略列表可重试）
    Navigation {
        role: Role,
        step: String,
        detail: String,
    },
    /// 内容提取失败（所有通道耗尽时，仅对当前关卡致命）
    Extraction { detail: String },
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Browser(e) => write!(f, "浏览器错误: {}", e),
            AppError::Login { role, reason } => {
                write!(f, "{}账号登录失败: {}", role, reason)
            }
            AppError::SessionExpired { role } => {
                write!(f, "{}账号会话失效，需要重新登录", role)
            }
            AppError::Navigation { role, step, detail } => {
                write!(f, "{}账号导航失败 (步骤: {}): {}", role, step, detail)
            }
            AppError::Extraction { detail } => write!(f, "内容提取失败: {}", detail),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Browser(e) => Some(e),
            _ => None,
        }
    }
}

/// 浏览器相关错误
#[derive(Debug)]
pub enum BrowserError {
    /// 启动浏览器失败
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserError::LaunchFailed { source } => {
                write!(f, "启动浏览器失败: {}", source)
            }
            BrowserError::PageCreationFailed { source } => {
                write!(f, "创建页面失败: {}", source)
            }
            BrowserError::NavigationFailed { url, source } => {
                write!(f, "导航到 {} 失败: {}", url, source)
            }
            BrowserError::ScriptExecutionFailed { source } => {
                write!(f, "执行脚本失败: {}", source)
            }
        }
    }
}

impl std::error::Error for BrowserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrowserError::LaunchFailed { source }
            | BrowserError::PageCreationFailed { source }
            | BrowserError::NavigationFailed { source, .. }
            | BrowserError::ScriptExecutionFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON解析失败: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(format!("IO错误: {}", err))
    }
}

// ========== 便捷构造与判定 ==========

impl AppError {
    /// 创建登录失败错误
    pub fn login_failed(role: Role, reason: impl Into<String>) -> Self {
        AppError::Login {
            role,
            reason: reason.into(),
        }
    }

    /// 创建导航失败错误
    pub fn navigation_failed(
        role: Role,
        step: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        AppError::Navigation {
            role,
            step: step.into(),
            detail: detail.into(),
        }
    }

    /// 创建内容提取失败错误
    pub fn extraction_failed(detail: impl Into<String>) -> Self {
        AppError::Extraction {
            detail: detail.into(),
        }
    }
}

/// 判断 anyhow 错误链中是否为"会话失效"（需要重新登录后重试）
pub fn is_session_expired(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::SessionExpired { .. })
    )
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expired_is_detected_through_anyhow() {
        let err: anyhow::Error = AppError::SessionExpired { role: Role::Target }.into();
        assert!(is_session_expired(&err));

        let other: anyhow::Error = AppError::Other("x".to_string()).into();
        assert!(!is_session_expired(&other));
    }

    #[test]
    fn display_carries_role() {
        let err = AppError::login_failed(Role::Source, "无法找到登录按钮");
        assert!(err.to_string().contains("来源"));
    }
}
