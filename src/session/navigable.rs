//! 可导航会话能力集合
//!
//! 所有上层模块（定位解析、内容提取、会话代理、遍历状态机）只依赖这个
//! trait，不直接接触 chromiumoxide 类型。页面交互统一走"在页面里执行一个
//! `(window, document) => ...` 函数"的通道，帧子会话通过改写该通道实现。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::locator::{ElementDescriptor, ProbeMode};

/// 单个 UI 会话的能力集合
///
/// 每个角色拥有一个顶层会话；`frames()` 返回的子会话是对顶层会话的
/// 只读视图，不可导航。`adopt_new_session` 对应"操作触发了新标签页"
/// 的场景：活跃句柄切换到新标签页，之后的所有操作都落在新页面上。
#[async_trait]
pub trait NavigableSession: Send + Sync {
    /// 当前页面 URL
    async fn current_url(&self) -> Result<String>;

    /// 导航到指定 URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// 在页面中执行一个 `(window, document) => ...` 形式的 JS 函数
    async fn evaluate(&self, js_fn: &str) -> Result<JsonValue>;

    /// 派发组合键（如 "Control+A"、"Backspace"），落在当前聚焦元素上
    async fn press(&self, combo: &str) -> Result<()>;

    /// 在当前聚焦元素处插入文本（逐字输入的等价物）
    async fn insert_text(&self, text: &str) -> Result<()>;

    /// 列出页面内嵌帧的只读子会话
    async fn frames(&self) -> Result<Vec<Box<dyn NavigableSession>>>;

    /// 等待并接管操作触发的新标签页；返回是否发生了切换
    async fn adopt_new_session(&mut self, wait: Duration) -> Result<bool>;

    /// 探测描述符是否命中（存在 / 可见）
    async fn probe(&self, descriptor: &ElementDescriptor, mode: ProbeMode) -> Result<bool> {
        let result = self.evaluate(&probe_js(descriptor, mode)).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// 点击描述符命中的第一个（优先可见的）元素
    async fn click(&self, descriptor: &ElementDescriptor) -> Result<bool> {
        let result = self.evaluate(&click_js(descriptor)).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// 向输入框写入值（走原生 setter 并派发 input/change 事件，
    /// 兼容受控组件）
    async fn fill(&self, selector: &str, value: &str) -> Result<bool> {
        let result = self.evaluate(&fill_js(selector, value)).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// 页面可见文本
    async fn body_text(&self) -> Result<String> {
        let result = self
            .evaluate("(window, document) => (document.body ? document.body.innerText : '')")
            .await?;
        Ok(result.as_str().unwrap_or("").to_string())
    }
}

/// JS 字符串字面量转义
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

pub(crate) fn probe_js(descriptor: &ElementDescriptor, mode: ProbeMode) -> String {
    let selector = js_str(&descriptor.selector);
    let text = js_str(descriptor.text_filter.as_deref().unwrap_or(""));
    let require_visible = matches!(mode, ProbeMode::Visible);
    format!(
        r#"(window, document) => {{
  const text = {text};
  let els = Array.from(document.querySelectorAll({selector}));
  if (text) {{ els = els.filter((el) => (el.innerText || '').includes(text)); }}
  if (els.length === 0) {{ return false; }}
  if (!{require_visible}) {{ return true; }}
  return els.some((el) => el.offsetParent !== null);
}}"#
    )
}

pub(crate) fn click_js(descriptor: &ElementDescriptor) -> String {
    let selector = js_str(&descriptor.selector);
    let text = js_str(descriptor.text_filter.as_deref().unwrap_or(""));
    format!(
        r#"(window, document) => {{
  const text = {text};
  let els = Array.from(document.querySelectorAll({selector}));
  if (text) {{ els = els.filter((el) => (el.innerText || '').includes(text)); }}
  const target = els.find((el) => el.offsetParent !== null) || els[0];
  if (!target) {{ return false; }}
  if (target.scrollIntoView) {{ target.scrollIntoView({{ block: 'center' }}); }}
  target.click();
  return true;
}}"#
    )
}

pub(crate) fn fill_js(selector: &str, value: &str) -> String {
    let selector = js_str(selector);
    let value = js_str(value);
    format!(
        r#"(window, document) => {{
  const el = document.querySelector({selector});
  if (!el) {{ return false; }}
  el.focus();
  const proto = el.tagName === 'TEXTAREA'
    ? window.HTMLTextAreaElement.prototype
    : window.HTMLInputElement.prototype;
  const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
  setter.call(el, {value});
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_js_escapes_selector_and_text() {
        let descriptor =
            ElementDescriptor::with_text("next-button", "a.ghost\"quote", "下一关");
        let js = probe_js(&descriptor, ProbeMode::Visible);
        assert!(js.contains(r#""a.ghost\"quote""#));
        assert!(js.contains("下一关"));
        assert!(js.contains("offsetParent"));
    }

    #[test]
    fn attached_probe_skips_visibility_check() {
        let descriptor = ElementDescriptor::new("editor", ".monaco-editor");
        let js = probe_js(&descriptor, ProbeMode::Attached);
        assert!(js.contains("if (!false)"));
    }
}
