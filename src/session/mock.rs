//! 测试用会话替身
//!
//! 按描述符 kind 脚本化探测/点击结果，按 JS 片段标记脚本化 evaluate
//! 返回值。所有调用都会被记录，便于断言"哪些路线被尝试过、哪些没有"。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::locator::{ElementDescriptor, ProbeMode};

use super::NavigableSession;

/// 依次消费的值序列；耗尽后粘在最后一个值上
struct Sequence<T> {
    values: Vec<T>,
    cursor: usize,
}

impl<T: Clone> Sequence<T> {
    fn next(&mut self) -> Option<T> {
        if self.values.is_empty() {
            return None;
        }
        let value = self.values[self.cursor.min(self.values.len() - 1)].clone();
        if self.cursor < self.values.len() - 1 {
            self.cursor += 1;
        }
        Some(value)
    }
}

struct EvalRule {
    marker: String,
    sequence: Sequence<JsonValue>,
}

#[derive(Default)]
pub struct MockSession {
    url: Mutex<String>,
    body: Mutex<String>,
    probe_rules: Mutex<HashMap<String, Sequence<bool>>>,
    click_results: Mutex<HashMap<String, bool>>,
    eval_rules: Mutex<Vec<EvalRule>>,
    redirect_once: Mutex<Option<String>>,
    editor_emulation: Mutex<bool>,
    editor_value: Mutex<Option<String>>,

    probe_log: Mutex<Vec<String>>,
    click_log: Mutex<Vec<String>>,
    eval_log: Mutex<Vec<String>>,
    fill_log: Mutex<Vec<(String, String)>>,
    press_log: Mutex<Vec<String>>,
    insert_log: Mutex<Vec<String>>,
    nav_log: Mutex<Vec<String>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&self, url: &str) {
        *self.url.lock().unwrap() = url.to_string();
    }

    pub fn set_body(&self, text: &str) {
        *self.body.lock().unwrap() = text.to_string();
    }

    /// 下一次 navigate 会"被重定向"到指定 URL（只生效一次）
    pub fn redirect_next_navigation_to(&self, url: &str) {
        *self.redirect_once.lock().unwrap() = Some(url.to_string());
    }

    pub fn set_probe(&self, kind: &str, result: bool) {
        self.set_probe_sequence(kind, vec![result]);
    }

    pub fn set_probe_sequence(&self, kind: &str, results: Vec<bool>) {
        self.probe_rules.lock().unwrap().insert(
            kind.to_string(),
            Sequence {
                values: results,
                cursor: 0,
            },
        );
    }

    pub fn set_click_result(&self, kind: &str, result: bool) {
        self.click_results
            .lock()
            .unwrap()
            .insert(kind.to_string(), result);
    }

    /// 模拟有状态的编辑器 API：setValue 脚本写入的代码字面量被存下来，
    /// 之后的 getModels 读取脚本原样返回它
    pub fn emulate_editor_api(&self) {
        *self.editor_emulation.lock().unwrap() = true;
    }

    /// 当 evaluate 的脚本包含 `marker` 时返回 `value`
    pub fn on_eval(&self, marker: &str, value: JsonValue) {
        self.on_eval_sequence(marker, vec![value]);
    }

    /// 同上，但依次返回多个值（耗尽后重复最后一个）
    pub fn on_eval_sequence(&self, marker: &str, values: Vec<JsonValue>) {
        self.eval_rules.lock().unwrap().push(EvalRule {
            marker: marker.to_string(),
            sequence: Sequence { values, cursor: 0 },
        });
    }

    // ---- 调用记录 ----

    pub fn probed_kinds(&self) -> Vec<String> {
        self.probe_log.lock().unwrap().clone()
    }

    pub fn clicked_kinds(&self) -> Vec<String> {
        self.click_log.lock().unwrap().clone()
    }

    pub fn eval_scripts(&self) -> Vec<String> {
        self.eval_log.lock().unwrap().clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.fill_log.lock().unwrap().clone()
    }

    pub fn presses(&self) -> Vec<String> {
        self.press_log.lock().unwrap().clone()
    }

    pub fn inserted_texts(&self) -> Vec<String> {
        self.insert_log.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.nav_log.lock().unwrap().clone()
    }
}

/// 从 `const code = "...";` 形式的脚本中取出代码字面量
fn embedded_code_literal(js_fn: &str) -> Option<String> {
    let start = js_fn.find("const code = ")? + "const code = ".len();
    let end = js_fn[start..].find(";\n")? + start;
    serde_json::from_str(&js_fn[start..end]).ok()
}

/// 测试需要在会话被代理接管后继续断言调用记录时，用 `Arc` 共享替身
#[async_trait]
impl NavigableSession for std::sync::Arc<MockSession> {
    async fn current_url(&self) -> Result<String> {
        (**self).current_url().await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        (**self).navigate(url).await
    }

    async fn evaluate(&self, js_fn: &str) -> Result<JsonValue> {
        (**self).evaluate(js_fn).await
    }

    async fn press(&self, combo: &str) -> Result<()> {
        (**self).press(combo).await
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        (**self).insert_text(text).await
    }

    async fn frames(&self) -> Result<Vec<Box<dyn NavigableSession>>> {
        (**self).frames().await
    }

    async fn adopt_new_session(&mut self, _wait: Duration) -> Result<bool> {
        Ok(false)
    }

    async fn probe(&self, descriptor: &ElementDescriptor, mode: ProbeMode) -> Result<bool> {
        (**self).probe(descriptor, mode).await
    }

    async fn click(&self, descriptor: &ElementDescriptor) -> Result<bool> {
        (**self).click(descriptor).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<bool> {
        (**self).fill(selector, value).await
    }

    async fn body_text(&self) -> Result<String> {
        (**self).body_text().await
    }
}

#[async_trait]
impl NavigableSession for MockSession {
    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.nav_log.lock().unwrap().push(url.to_string());
        let landed = self
            .redirect_once
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| url.to_string());
        *self.url.lock().unwrap() = landed;
        Ok(())
    }

    async fn evaluate(&self, js_fn: &str) -> Result<JsonValue> {
        self.eval_log.lock().unwrap().push(js_fn.to_string());
        if *self.editor_emulation.lock().unwrap() {
            // 写脚本里同时有 setValue 和 getModels，先判写
            if js_fn.contains("setValue") {
                if let Some(code) = embedded_code_literal(js_fn) {
                    *self.editor_value.lock().unwrap() = Some(code);
                    return Ok(JsonValue::Bool(true));
                }
            } else if js_fn.contains("getModels") {
                return Ok(match self.editor_value.lock().unwrap().clone() {
                    Some(code) => JsonValue::String(code),
                    None => JsonValue::Null,
                });
            }
        }
        let mut rules = self.eval_rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if js_fn.contains(&rule.marker) {
                return Ok(rule.sequence.next().unwrap_or(JsonValue::Null));
            }
        }
        Ok(JsonValue::Null)
    }

    async fn press(&self, combo: &str) -> Result<()> {
        self.press_log.lock().unwrap().push(combo.to_string());
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        self.insert_log.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn frames(&self) -> Result<Vec<Box<dyn NavigableSession>>> {
        Ok(Vec::new())
    }

    async fn adopt_new_session(&mut self, _wait: Duration) -> Result<bool> {
        Ok(false)
    }

    async fn probe(&self, descriptor: &ElementDescriptor, _mode: ProbeMode) -> Result<bool> {
        self.probe_log
            .lock()
            .unwrap()
            .push(descriptor.kind.to_string());
        let mut rules = self.probe_rules.lock().unwrap();
        Ok(rules
            .get_mut(descriptor.kind)
            .and_then(|seq| seq.next())
            .unwrap_or(false))
    }

    async fn click(&self, descriptor: &ElementDescriptor) -> Result<bool> {
        self.click_log
            .lock()
            .unwrap()
            .push(descriptor.kind.to_string());
        Ok(self
            .click_results
            .lock()
            .unwrap()
            .get(descriptor.kind)
            .copied()
            .unwrap_or(true))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<bool> {
        self.fill_log
            .lock()
            .unwrap()
            .push((selector.to_string(), value.to_string()));
        Ok(true)
    }

    async fn body_text(&self) -> Result<String> {
        Ok(self.body.lock().unwrap().clone())
    }
}
