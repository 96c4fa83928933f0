use anyhow::Result;
use tracing::info;

use crate::agent::SessionAgent;
use crate::browser;
use crate::config::Config;
use crate::reporter::RunSummary;
use crate::session::{ChromeSession, Role};
use crate::traversal::LabTraversal;

/// 应用主结构
pub struct App {
    config: Config,
    source: SessionAgent,
    target: SessionAgent,
}

impl App {
    /// 初始化应用：启动浏览器，为两个账号各建一个会话代理
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let (browser, source_page, target_page) = browser::acquire(&config).await?;
        let source_session =
            ChromeSession::new(browser.clone(), source_page, &config.timeouts).await;
        let target_session = ChromeSession::new(browser, target_page, &config.timeouts).await;

        let source = SessionAgent::new(
            Role::Source,
            config.source.clone(),
            config.clone(),
            Box::new(source_session),
        );
        let target = SessionAgent::new(
            Role::Target,
            config.target.clone(),
            config.clone(),
            Box::new(target_session),
        );

        Ok(Self {
            config,
            source,
            target,
        })
    }

    /// 运行主流程：双登录 → 双导航 → 遍历复制
    pub async fn run(mut self) -> Result<RunSummary> {
        info!("--- 步骤 1: 双账号登录 ---");
        {
            let (source, target) = (&mut self.source, &mut self.target);
            let (s, t) = tokio::join!(source.login(), target.login());
            s?;
            t?;
        }

        info!("--- 步骤 2: 导航到课程 ---");
        // 首次进课程走正常 UI 导航，不用直达链接（登录后的落地页不确定）
        {
            let (source, target) = (&mut self.source, &mut self.target);
            let (s, t) = tokio::join!(
                source.navigate_to_course_with_relogin(None),
                target.navigate_to_course_with_relogin(None)
            );
            s?;
            t?;
        }

        info!("--- 步骤 3: 同步实验进度 ---");
        let traversal = LabTraversal::new(self.source, self.target, self.config);
        let summary = traversal.run().await?;

        info!("✅ 双账号自动复制执行完毕");
        Ok(summary)
    }
}

fn log_startup(config: &Config) {
    info!("========================================");
    info!("  👥 头哥双账号自动复制 - 启动");
    info!("========================================");
    info!("课程: {}", config.course_name);
    info!("⏱ 每关等待时间: {}ms", config.timeouts.level_buffer);
}
