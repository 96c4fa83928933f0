//! # Educoder Auto Copy
//!
//! 把来源账号（已完成）的实验内容逐关复制到目标账号（未完成）的
//! 双会话自动化工具。
//!
//! ## 架构设计
//!
//! ### ① 会话层（Session）
//! - `session/` - `NavigableSession` 能力集合与 chromiumoxide 实现
//! - 帧（iframe）是顶层会话的只读子会话
//!
//! ### ② 定位层（Locator）
//! - `locator` - 按优先级消费 `ElementDescriptor` 列表的统一解析器
//! - `descriptors` - 站点全部语义元素的候选路线清单
//!
//! ### ③ 业务能力层
//! - `agent` - 单账号的登录 / 导航 / 列表 / 关卡切换
//! - `extractor` - 多通道内容读写（API / 剪贴板 / DOM / 键盘）
//! - `evaluation` - 测评提交、结果等待、关卡推进
//!
//! ### ④ 编排层
//! - `traversal` - 双会话扇出-扇入的遍历状态机
//! - `reporter` - 运行记录与总结
//! - `app` - 启动浏览器、建双会话、跑完整流程

pub mod agent;
pub mod app;
pub mod browser;
pub mod config;
pub mod descriptors;
pub mod error;
pub mod evaluation;
pub mod extractor;
pub mod locator;
pub mod logger;
pub mod reporter;
pub mod session;
pub mod traversal;
pub mod utils;

// 重新导出常用类型
pub use agent::{LabSummary, SessionAgent};
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use extractor::{ChoiceAnswer, ExtractedContent, SkipReason};
pub use locator::{ElementDescriptor, ProbeMode};
pub use reporter::{RunReporter, RunSummary};
pub use session::{ChromeSession, NavigableSession, Role};
pub use traversal::LabTraversal;
