//! 会话层 - 基础设施
//!
//! `NavigableSession` 是核心消费的能力集合；`ChromeSession` 基于
//! chromiumoxide 的 Page 实现它。帧（iframe）以只读子会话的形式暴露，
//! 不独立持有页面。

pub mod chrome;
pub mod navigable;

#[cfg(test)]
pub mod mock;

pub use chrome::ChromeSession;
pub use navigable::NavigableSession;

use std::fmt;

/// 会话角色：来源账号（已完成）或目标账号（未完成）
///
/// 每个角色在整个运行期间恰好拥有一个顶层会话。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Target,
}

impl Role {
    /// 日志前缀（沿用双账号脚本的颜色标记习惯）
    pub fn label(&self) -> &'static str {
        match self {
            Role::Source => "🔵 [来源账号]",
            Role::Target => "🔴 [目标账号]",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => write!(f, "来源"),
            Role::Target => write!(f, "目标"),
        }
    }
}
