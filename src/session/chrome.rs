//! 基于 chromiumoxide 的会话实现
//!
//! 顶层会话持有一个 Page 和共享的 Browser 句柄（用于发现新标签页）。
//! 键盘与文本输入走 CDP Input 域，无论焦点在主文档还是帧内都有效。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::{Browser, Page};
use serde_json::Value as JsonValue;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::Timeouts;

use super::NavigableSession;

/// 新标签页轮询间隔
const NEW_PAGE_POLL: Duration = Duration::from_millis(500);

/// 顶层浏览器会话
pub struct ChromeSession {
    browser: Arc<Browser>,
    page: Page,
    known_targets: HashSet<TargetId>,
    navigation_settle: Duration,
}

impl ChromeSession {
    /// 包装一个已创建的页面；记录当前所有 target 以便之后识别新标签页
    pub async fn new(browser: Arc<Browser>, page: Page, timeouts: &Timeouts) -> Self {
        let mut known_targets = HashSet::new();
        if let Ok(pages) = browser.pages().await {
            for p in &pages {
                known_targets.insert(p.target_id().clone());
            }
        }
        known_targets.insert(page.target_id().clone());
        Self {
            browser,
            page,
            known_targets,
            navigation_settle: navigation_settle(timeouts),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }
}

#[async_trait]
impl NavigableSession for ChromeSession {
    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        // 等待导航稳定；超时不视为失败，由上层的容器等待兜底
        match tokio::time::timeout(self.navigation_settle, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("⚠️ 等待导航完成出错 ({}): {}", url, e),
            Err(_) => debug!("⚠️ 等待导航完成超时: {}", url),
        }
        Ok(())
    }

    async fn evaluate(&self, js_fn: &str) -> Result<JsonValue> {
        let expression = format!("({})(window, document)", js_fn);
        let result = self.page.evaluate(expression).await?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    async fn press(&self, combo: &str) -> Result<()> {
        dispatch_key_combo(&self.page, combo).await
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        insert_text(&self.page, text).await
    }

    async fn frames(&self) -> Result<Vec<Box<dyn NavigableSession>>> {
        let count = self
            .evaluate("(window, document) => document.querySelectorAll('iframe').length")
            .await?
            .as_u64()
            .unwrap_or(0) as usize;
        let mut frames: Vec<Box<dyn NavigableSession>> = Vec::with_capacity(count);
        for index in 0..count {
            frames.push(Box::new(FrameSession {
                page: self.page.clone(),
                index,
            }));
        }
        Ok(frames)
    }

    async fn adopt_new_session(&mut self, wait: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if let Ok(pages) = self.browser.pages().await {
                for p in pages {
                    let id = p.target_id().clone();
                    if !self.known_targets.contains(&id) {
                        self.known_targets.insert(id);
                        let _ = p.bring_to_front().await;
                        info!("✅ 检测到新标签页，切换活跃会话");
                        self.page = p;
                        return Ok(true);
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(NEW_PAGE_POLL).await;
        }
    }
}

/// 帧子会话：对顶层页面中第 `index` 个 iframe 的只读视图
///
/// JS 执行被改写到 `contentWindow` 作用域；跨域帧的访问错误统一折叠为
/// `null`，由调用方当作"未命中"处理。键盘输入仍然落在顶层页面上——
/// CDP 的输入事件作用于聚焦元素，与帧无关。
struct FrameSession {
    page: Page,
    index: usize,
}

#[async_trait]
impl NavigableSession for FrameSession {
    async fn current_url(&self) -> Result<String> {
        let value = self
            .evaluate("(window, document) => window.location.href")
            .await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    async fn navigate(&self, _url: &str) -> Result<()> {
        bail!("帧子会话是只读的，不支持导航")
    }

    async fn evaluate(&self, js_fn: &str) -> Result<JsonValue> {
        let expression = format!(
            r#"(() => {{
  try {{
    const __frame = document.querySelectorAll('iframe')[{index}];
    if (!__frame || !__frame.contentWindow || !__frame.contentWindow.document) {{ return null; }}
    return ({js_fn})(__frame.contentWindow, __frame.contentWindow.document);
  }} catch (e) {{ return null; }}
}})()"#,
            index = self.index,
            js_fn = js_fn,
        );
        let result = self.page.evaluate(expression).await?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    async fn press(&self, combo: &str) -> Result<()> {
        dispatch_key_combo(&self.page, combo).await
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        insert_text(&self.page, text).await
    }

    async fn frames(&self) -> Result<Vec<Box<dyn NavigableSession>>> {
        Ok(Vec::new())
    }

    async fn adopt_new_session(&mut self, _wait: Duration) -> Result<bool> {
        Ok(false)
    }
}

/// 页面加载超时即导航后的稳定等待上限；配置给 0 时退回 1 秒下限
fn navigation_settle(timeouts: &Timeouts) -> Duration {
    Duration::from_millis(timeouts.page_load.max(1_000))
}

/// 派发一次组合键（keydown + keyup）
async fn dispatch_key_combo(page: &Page, combo: &str) -> Result<()> {
    let mut modifiers = 0i64;
    let mut key_token = "";
    for part in combo.split('+') {
        match part {
            "Control" | "Ctrl" => modifiers |= 2,
            "Alt" => modifiers |= 1,
            "Shift" => modifiers |= 8,
            other => key_token = other,
        }
    }
    let (key, code, virtual_key) = key_params(key_token)?;

    for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
        let params = DispatchKeyEventParams::builder()
            .r#type(event_type)
            .modifiers(modifiers)
            .key(key)
            .code(code)
            .windows_virtual_key_code(virtual_key)
            .native_virtual_key_code(virtual_key)
            .build()
            .map_err(|e| anyhow!("构造按键事件失败: {}", e))?;
        page.execute(params).await?;
    }
    Ok(())
}

/// 在聚焦元素处插入文本（CDP Input.insertText）
async fn insert_text(page: &Page, text: &str) -> Result<()> {
    let params = InsertTextParams::builder()
        .text(text)
        .build()
        .map_err(|e| anyhow!("构造文本插入事件失败: {}", e))?;
    page.execute(params).await?;
    Ok(())
}

fn key_params(token: &str) -> Result<(&'static str, &'static str, i64)> {
    match token.to_ascii_lowercase().as_str() {
        "a" => Ok(("a", "KeyA", 65)),
        "c" => Ok(("c", "KeyC", 67)),
        "v" => Ok(("v", "KeyV", 86)),
        "x" => Ok(("x", "KeyX", 88)),
        "backspace" => Ok(("Backspace", "Backspace", 8)),
        "enter" => Ok(("Enter", "Enter", 13)),
        _ => bail!("不支持的按键: {}", token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_params_cover_shortcut_keys() {
        assert_eq!(key_params("A").unwrap(), ("a", "KeyA", 65));
        assert_eq!(key_params("Backspace").unwrap(), ("Backspace", "Backspace", 8));
        assert!(key_params("F13").is_err());
    }

    #[test]
    fn navigation_settle_follows_page_load_timeout() {
        let timeouts = Timeouts {
            page_load: 35_000,
            ..Timeouts::default()
        };
        assert_eq!(navigation_settle(&timeouts), Duration::from_secs(35));
        assert_eq!(
            navigation_settle(&Timeouts::default()),
            Duration::from_secs(20)
        );

        // 配置错填 0 也不能把稳定等待压成零
        let zero = Timeouts {
            page_load: 0,
            ..Timeouts::default()
        };
        assert_eq!(navigation_settle(&zero), Duration::from_secs(1));
    }
}
