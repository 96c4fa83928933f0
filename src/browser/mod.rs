//! 浏览器生命周期
//!
//! 一个浏览器进程承载两个账号的页面。运行结束不关闭浏览器，
//! 留着最终页面状态供人工检查。

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{AppError, BrowserError};

/// 启动浏览器并创建来源/目标两个页面
pub async fn acquire(config: &Config) -> Result<(Arc<Browser>, Page, Page)> {
    info!("🚀 启动浏览器 (headless: {})...", config.headless);

    let mut builder = BrowserConfig::builder().args(vec![
        "--disable-gpu",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--remote-debugging-port=0",
    ]);
    builder = if config.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    let browser_config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        anyhow::anyhow!("配置浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        AppError::Browser(BrowserError::LaunchFailed {
            source: Box::new(e),
        })
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let source_page = new_page(&browser, &config.login_url).await?;
    let target_page = new_page(&browser, &config.login_url).await?;
    info!("✅ 浏览器已就绪，两个会话页面已打开");

    Ok((Arc::new(browser), source_page, target_page))
}

async fn new_page(browser: &Browser, url: &str) -> Result<Page> {
    let page = browser.new_page(url).await.map_err(|e| {
        error!("创建页面失败: {}", e);
        AppError::Browser(BrowserError::PageCreationFailed {
            source: Box::new(e),
        })
    })?;
    Ok(page)
}
