//! 关卡内容提取与写入
//!
//! 读路径按可靠性降序尝试多个通道：编辑器 API（Monaco / CodeMirror）、
//! 剪贴板（全选复制，规避虚拟滚动丢行）、DOM 抓取（按 top 排序兜底），
//! 主文档不命中时再逐个尝试帧子会话。写路径同理：API 优先，剪贴板粘贴
//! 次之，逐字输入兜底。选择题不走编辑器，直接读写选项勾选状态。

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::descriptors;
use crate::error::AppError;
use crate::locator::{self, ProbeMode};
use crate::session::NavigableSession;
use crate::utils::truncate_text;

/// 编辑器完全加载前的固定等待
const EDITOR_SETTLE: Duration = Duration::from_secs(5);

/// 键盘操作之间的短暂停顿
const KEY_PAUSE: Duration = Duration::from_millis(300);

/// 无需复制内容的关卡类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 没有评测按钮
    NoEvaluationButton,
    /// 命令行操作类关卡
    CommandLineOnly,
    /// 需要手动启动实验环境
    EnvStartRequired,
    /// 关卡未解锁
    LevelLocked,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoEvaluationButton => "NO_EVALUATION_BUTTON",
            SkipReason::CommandLineOnly => "COMMAND_LINE_ONLY",
            SkipReason::EnvStartRequired => "ENV_START_REQUIRED",
            SkipReason::LevelLocked => "LEVEL_LOCKED",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token {
            "NO_EVALUATION_BUTTON" => Some(SkipReason::NoEvaluationButton),
            "COMMAND_LINE_ONLY" => Some(SkipReason::CommandLineOnly),
            "ENV_START_REQUIRED" => Some(SkipReason::EnvStartRequired),
            "LEVEL_LOCKED" => Some(SkipReason::LevelLocked),
            _ => None,
        }
    }
}

/// 单道选择题的作答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceAnswer {
    pub question_index: usize,
    pub selected_options: Vec<usize>,
}

/// 从来源关卡提取出的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedContent {
    /// 编辑器代码
    Code(String),
    /// 选择题作答
    Choice(Vec<ChoiceAnswer>),
    /// 无内容可复制，附跳过原因
    Skip(SkipReason),
}

/// 读取当前关卡的内容
pub async fn read(
    session: &dyn NavigableSession,
    timeouts: &Timeouts,
) -> Result<ExtractedContent> {
    info!("⏳ 正在获取关卡内容...");
    sleep(EDITOR_SETTLE).await;

    // 特殊关卡检测：无评测按钮 / 命令行 / 待启动环境 / 锁定
    let classified = session.evaluate(&classify_js()).await?;
    if let Some(token) = classified.as_str() {
        if let Some(reason) = SkipReason::parse(token) {
            info!("⚠️ 检测到无需复制的关卡 ({})", reason.as_str());
            return Ok(ExtractedContent::Skip(reason));
        }
    }

    // 选择题关卡不走编辑器通道
    let choice_visible = session
        .evaluate(&choice_container_visible_js())
        .await?
        .as_bool()
        .unwrap_or(false);
    if choice_visible {
        info!("📝 检测到选择题关卡，正在提取答案...");
        let raw = session.evaluate(&extract_choice_js()).await?;
        let answers: Vec<ChoiceAnswer> = serde_json::from_value(raw)?;
        info!("✅ 提取到 {} 道已作答题目", answers.len());
        return Ok(ExtractedContent::Choice(answers));
    }

    // 等待编辑器出现（存在即可）
    let editor = locator::resolve(
        session,
        &descriptors::editor_markers(),
        ProbeMode::Attached,
        Duration::from_millis(timeouts.element_wait),
        Duration::from_millis(timeouts.probe),
    )
    .await?;
    if editor.is_none() {
        warn!("⚠️ 等待编辑器出现超时，仍尝试提取");
    }

    if let Some(code) = read_code(session).await? {
        info!("✅ 成功获取代码 ({} 字符)", code.chars().count());
        debug!("代码预览: {}", truncate_text(&code, 100));
        return Ok(ExtractedContent::Code(code));
    }

    // 主文档不命中时遍历帧
    debug!("⚠️ 主页面未找到编辑器，遍历 iframe...");
    for frame in session.frames().await? {
        match frame_read_code(frame.as_ref()).await {
            Ok(Some(code)) => {
                info!("✅ 在 iframe 中找到代码 ({} 字符)", code.chars().count());
                return Ok(ExtractedContent::Code(code));
            }
            Ok(None) => {}
            // 跨域帧的访问错误不致命
            Err(e) => debug!("⚠️ 帧内提取失败: {}", e),
        }
    }

    Err(AppError::extraction_failed("无法找到编辑器实例或代码内容").into())
}

/// 将内容写入当前关卡
pub async fn write(
    session: &dyn NavigableSession,
    content: &ExtractedContent,
    timeouts: &Timeouts,
) -> Result<()> {
    match content {
        ExtractedContent::Skip(reason) => {
            debug!("跳过写入 ({})", reason.as_str());
            Ok(())
        }
        ExtractedContent::Choice(answers) => write_choice(session, answers, timeouts).await,
        ExtractedContent::Code(code) => write_code(session, code).await,
    }
}

/// 依次尝试 API 与剪贴板通道读取代码，再回退 DOM 抓取
async fn read_code(session: &dyn NavigableSession) -> Result<Option<String>> {
    if let Some(code) = non_empty(session.evaluate(&extract_via_api_js()).await?) {
        debug!("✓ 编辑器 API 提取成功");
        return Ok(Some(code));
    }

    if let Some(code) = read_code_via_clipboard(session).await? {
        debug!("✓ 剪贴板提取成功");
        return Ok(Some(code));
    }

    debug!("⚠️ API 和剪贴板均失败，尝试 DOM 抓取 (可能不完整)...");
    Ok(non_empty(session.evaluate(&extract_via_dom_js()).await?))
}

/// 帧子会话只走 API 与剪贴板（帧内 DOM 抓取效果差）
async fn frame_read_code(frame: &dyn NavigableSession) -> Result<Option<String>> {
    if let Some(code) = non_empty(frame.evaluate(&extract_via_api_js()).await?) {
        return Ok(Some(code));
    }
    read_code_via_clipboard(frame).await
}

/// 全选复制后从剪贴板读取（解决虚拟滚动导致 DOM 里只有可见行的问题）
async fn read_code_via_clipboard(session: &dyn NavigableSession) -> Result<Option<String>> {
    let focused = session
        .evaluate(&focus_editor_js())
        .await?
        .as_bool()
        .unwrap_or(false);
    if !focused {
        return Ok(None);
    }
    sleep(KEY_PAUSE).await;
    session.press("Control+A").await?;
    sleep(KEY_PAUSE).await;
    session.press("Control+C").await?;
    sleep(KEY_PAUSE).await;

    let clipboard = session
        .evaluate("(window, document) => navigator.clipboard.readText()")
        .await?;
    Ok(non_empty(clipboard))
}

async fn write_choice(
    session: &dyn NavigableSession,
    answers: &[ChoiceAnswer],
    timeouts: &Timeouts,
) -> Result<()> {
    info!("📝 正在填写选择题答案...");

    // 选择题容器可能在主文档，也可能在帧内
    let container_in_main = locator::resolve(
        session,
        &[crate::locator::ElementDescriptor::new(
            "choose-container",
            "ul.choose-container",
        )],
        ProbeMode::Visible,
        Duration::from_millis(timeouts.element_wait),
        Duration::from_millis(timeouts.probe),
    )
    .await?
    .is_some();

    if container_in_main {
        apply_choice(session, answers).await?;
        info!("✅ 选择题填写完成");
        return Ok(());
    }

    debug!("ℹ️ 主页面未找到选择题容器，尝试查找 iframe...");
    for frame in session.frames().await? {
        let visible = frame
            .evaluate(&choice_container_visible_js())
            .await
            .map(|v| v.as_bool().unwrap_or(false))
            .unwrap_or(false);
        if visible {
            apply_choice(frame.as_ref(), answers).await?;
            info!("✅ 选择题填写完成 (iframe)");
            return Ok(());
        }
    }

    Err(AppError::extraction_failed("未找到选择题容器 (ul.choose-container)").into())
}

async fn apply_choice(session: &dyn NavigableSession, answers: &[ChoiceAnswer]) -> Result<()> {
    for answer in answers {
        info!(
            "   - 第 {} 题，选择选项: {:?}",
            answer.question_index + 1,
            answer.selected_options
        );
        for &option in &answer.selected_options {
            let clicked = session
                .evaluate(&select_option_js(answer.question_index, option))
                .await?;
            match clicked.as_str() {
                Some("clicked") | Some("already-checked") => {}
                _ => warn!(
                    "⚠️ 无法找到选项 {} (第 {} 题)",
                    option,
                    answer.question_index + 1
                ),
            }
            sleep(Duration::from_millis(200)).await;
        }
    }
    Ok(())
}

async fn write_code(session: &dyn NavigableSession, code: &str) -> Result<()> {
    info!("⏳ 正在写入代码...");
    let _ = session.evaluate(&focus_editor_js()).await;
    sleep(KEY_PAUSE).await;

    // 通道 1: 编辑器 API
    let written = session
        .evaluate(&write_via_api_js(code))
        .await?
        .as_bool()
        .unwrap_or(false);
    if written {
        info!("✅ 代码写入成功 (API)");
        return Ok(());
    }

    debug!("⚠️ 主页面 API 写入失败，遍历 iframe...");
    for frame in session.frames().await? {
        let ok = frame
            .evaluate(&write_via_api_js(code))
            .await
            .map(|v| v.as_bool().unwrap_or(false))
            .unwrap_or(false);
        if ok {
            info!("✅ 代码写入成功 (iframe API)");
            return Ok(());
        }
    }

    // 通道 2: 剪贴板粘贴（保留缩进）
    warn!("⚠️ 无法通过 API 写入，尝试剪贴板粘贴...");
    let _ = session.evaluate(&focus_editor_js()).await;
    sleep(KEY_PAUSE).await;
    let clipboard_ok = session
        .evaluate(&write_clipboard_js(code))
        .await
        .map(|v| v.as_bool().unwrap_or(false))
        .unwrap_or(false);
    session.press("Control+A").await?;
    session.press("Backspace").await?;
    if clipboard_ok {
        session.press("Control+V").await?;
        info!("✅ 模拟粘贴 (Clipboard+Ctrl+V) 完成");
    } else {
        // 通道 3: 逐字输入兜底
        warn!("⚠️ 剪贴板写入失败，回退到逐字输入");
        session.insert_text(code).await?;
        info!("✅ 模拟输入 (insertText) 完成");
    }
    sleep(Duration::from_secs(1)).await;
    Ok(())
}

fn non_empty(value: JsonValue) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

// ---- 页面内执行的 JS ----

/// 特殊关卡分类；正常关卡返回 null
fn classify_js() -> String {
    r#"(window, document) => {
  const hasSubmitBtn =
    document.querySelector('#submit_code_btn') ||
    document.querySelector('.submit-code-btn') ||
    Array.from(document.querySelectorAll('button')).some((b) => b.innerText.includes('评测'));
  if (!hasSubmitBtn) { return 'NO_EVALUATION_BUTTON'; }
  const mtk = document.querySelector('span.mtk1');
  if (mtk && mtk.innerText.includes('请在右侧命令行中直接操作')) { return 'COMMAND_LINE_ONLY'; }
  const pTags = Array.from(document.querySelectorAll('p'));
  if (pTags.some((p) => p.innerText.includes('点击上方按钮，启动实验环境'))) { return 'ENV_START_REQUIRED'; }
  const bodyText = document.body.innerText;
  if (bodyText.includes('完成上一关才能解锁') || bodyText.includes('上一关未完成')) { return 'LEVEL_LOCKED'; }
  return null;
}"#
    .to_string()
}

fn choice_container_visible_js() -> String {
    r#"(window, document) => {
  const el = document.querySelector('ul.choose-container');
  return !!(el && el.offsetParent !== null);
}"#
    .to_string()
}

/// 提取已勾选的选项索引，形如 [{questionIndex, selectedOptions}]
fn extract_choice_js() -> String {
    r#"(window, document) => {
  const results = [];
  const items = document.querySelectorAll('ul.choose-container > li');
  items.forEach((item, qIndex) => {
    const selected = [];
    const options = item.querySelectorAll('.option .ant-checkbox-wrapper, .option .ant-radio-wrapper');
    options.forEach((opt, oIndex) => {
      if (opt.classList.contains('ant-checkbox-wrapper-checked') ||
          opt.classList.contains('ant-radio-wrapper-checked') ||
          opt.classList.contains('checked')) {
        selected.push(oIndex);
      }
    });
    if (selected.length > 0) {
      results.push({ questionIndex: qIndex, selectedOptions: selected });
    }
  });
  return results;
}"#
    .to_string()
}

/// 勾选指定题目的指定选项；已勾选则跳过，避免 checkbox 反选
fn select_option_js(question_index: usize, option_index: usize) -> String {
    format!(
        r#"(window, document) => {{
  const items = document.querySelectorAll('ul.choose-container > li');
  const item = items[{question_index}];
  if (!item) {{ return 'no-question'; }}
  const options = item.querySelectorAll('.option .ant-checkbox-wrapper, .option .ant-radio-wrapper');
  const opt = options[{option_index}];
  if (!opt) {{ return 'no-option'; }}
  if (opt.classList.contains('ant-checkbox-wrapper-checked') ||
      opt.classList.contains('ant-radio-wrapper-checked') ||
      opt.classList.contains('checked')) {{
    return 'already-checked';
  }}
  opt.click();
  return 'clicked';
}}"#
    )
}

fn extract_via_api_js() -> String {
    r#"(window, document) => {
  if (window.monaco && window.monaco.editor) {
    const models = window.monaco.editor.getModels();
    if (models.length > 0) { return models[0].getValue(); }
  }
  const cm = document.querySelector('.CodeMirror');
  if (cm && cm.CodeMirror) { return cm.CodeMirror.getValue(); }
  return null;
}"#
    .to_string()
}

/// DOM 抓取兜底。Monaco 的行节点按 top 绝对定位且可能乱序，必须排序；
/// textContent 保留原始空白，NBSP 换回普通空格
fn extract_via_dom_js() -> String {
    r#"(window, document) => {
  const editors = Array.from(document.querySelectorAll('.monaco-editor'));
  const visible = editors.filter((e) => e.offsetParent !== null);
  let target = null;
  if (visible.length > 0) {
    target = visible.reduce((prev, cur) => (prev.clientHeight > cur.clientHeight ? prev : cur));
  } else {
    target = editors[0];
  }
  let viewLines = target
    ? target.querySelectorAll('.view-lines .view-line')
    : document.querySelectorAll('.view-lines .view-line');
  if (viewLines && viewLines.length > 0) {
    const sorted = Array.from(viewLines).sort((a, b) => {
      const topA = parseInt(window.getComputedStyle(a).top || '0', 10);
      const topB = parseInt(window.getComputedStyle(b).top || '0', 10);
      return topA - topB;
    });
    return sorted.map((line) => line.textContent.replace(/\u00A0/g, ' ')).join('\n');
  }
  const lines = document.querySelector('.view-lines');
  if (lines) { return lines.textContent.replace(/\u00A0/g, ' '); }
  return null;
}"#
    .to_string()
}

/// 点击编辑器以聚焦；返回是否找到编辑器元素
fn focus_editor_js() -> String {
    r#"(window, document) => {
  const el = document.querySelector('.monaco-editor, .CodeMirror, .view-lines');
  if (!el) { return false; }
  el.click();
  return true;
}"#
    .to_string()
}

fn write_via_api_js(code: &str) -> String {
    let code = serde_json::to_string(code).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(window, document) => {{
  const code = {code};
  try {{
    if (window.monaco && window.monaco.editor) {{
      const models = window.monaco.editor.getModels();
      if (models.length > 0) {{ models[0].setValue(code); return true; }}
    }}
    const cm = document.querySelector('.CodeMirror');
    if (cm && cm.CodeMirror) {{ cm.CodeMirror.setValue(code); return true; }}
    return false;
  }} catch (e) {{ return false; }}
}}"#
    )
}

fn write_clipboard_js(code: &str) -> String {
    let code = serde_json::to_string(code).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(window, document) => {{
  const code = {code};
  return navigator.clipboard.writeText(code).then(() => true).catch(() => false);
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockSession;
    use serde_json::json;

    #[test]
    fn skip_reason_tokens_round_trip() {
        for reason in [
            SkipReason::NoEvaluationButton,
            SkipReason::CommandLineOnly,
            SkipReason::EnvStartRequired,
            SkipReason::LevelLocked,
        ] {
            assert_eq!(SkipReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(SkipReason::parse("SOMETHING_ELSE"), None);
    }

    #[test]
    fn choice_answers_deserialize_from_page_shape() {
        let raw = json!([
            { "questionIndex": 0, "selectedOptions": [0, 2] },
            { "questionIndex": 2, "selectedOptions": [1] }
        ]);
        let answers: Vec<ChoiceAnswer> = serde_json::from_value(raw).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].selected_options, vec![0, 2]);
        assert_eq!(answers[1].question_index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn read_reports_skip_before_touching_editor() {
        let session = MockSession::new();
        // 分类脚本命中"无评测按钮"
        session.on_eval("submit_code_btn", json!("NO_EVALUATION_BUTTON"));

        let content = read(&session, &Timeouts::default()).await.unwrap();
        assert_eq!(
            content,
            ExtractedContent::Skip(SkipReason::NoEvaluationButton)
        );
        // 不应有任何键盘操作
        assert!(session.presses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn read_prefers_editor_api_over_clipboard() {
        let session = MockSession::new();
        session.on_eval("submit_code_btn", JsonValue::Null);
        session.on_eval("choose-container", json!(false));
        session.set_probe("monaco", true);
        session.on_eval("getModels", json!("print('hello')"));

        let content = read(&session, &Timeouts::default()).await.unwrap();
        assert_eq!(content, ExtractedContent::Code("print('hello')".into()));
        assert!(session.presses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn read_falls_back_to_clipboard_when_api_misses() {
        let session = MockSession::new();
        session.on_eval("submit_code_btn", JsonValue::Null);
        session.on_eval("choose-container", json!(false));
        session.set_probe("monaco", true);
        session.on_eval("getModels", JsonValue::Null);
        session.on_eval("el.click", json!(true));
        session.on_eval("readText", json!("x = 1\n"));

        let content = read(&session, &Timeouts::default()).await.unwrap();
        assert_eq!(content, ExtractedContent::Code("x = 1\n".into()));
        assert_eq!(
            session.presses(),
            vec!["Control+A".to_string(), "Control+C".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn write_code_uses_api_channel_when_available() {
        let session = MockSession::new();
        session.on_eval("setValue", json!(true));

        write(
            &session,
            &ExtractedContent::Code("let x = \"a\";".into()),
            &Timeouts::default(),
        )
        .await
        .unwrap();

        // 写入脚本中应携带转义后的代码字面量
        let scripts = session.eval_scripts();
        assert!(scripts
            .iter()
            .any(|s| s.contains("setValue") && s.contains(r#"let x = \"a\";"#)));
        assert!(session.presses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn api_write_then_api_read_round_trips() {
        let session = MockSession::new();
        session.emulate_editor_api();
        session.on_eval("submit_code_btn", JsonValue::Null);
        session.on_eval("choose-container", json!(false));
        session.set_probe("monaco", true);

        let code = "def solve(x):\n    return \"第1关\" + str(x)\n";
        write(
            &session,
            &ExtractedContent::Code(code.to_string()),
            &Timeouts::default(),
        )
        .await
        .unwrap();

        // API 写入后立即用 API 读回，内容必须逐字一致
        let content = read(&session, &Timeouts::default()).await.unwrap();
        assert_eq!(content, ExtractedContent::Code(code.to_string()));
        assert!(session.presses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn write_code_falls_back_to_insert_text() {
        let session = MockSession::new();
        session.on_eval("setValue", json!(false));
        session.on_eval("writeText", json!(false));

        write(
            &session,
            &ExtractedContent::Code("a\n  b".into()),
            &Timeouts::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            session.presses(),
            vec!["Control+A".to_string(), "Backspace".to_string()]
        );
        assert_eq!(session.inserted_texts(), vec!["a\n  b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn write_choice_skips_already_checked_options() {
        let session = MockSession::new();
        session.set_probe("choose-container", true);
        session.on_eval_sequence(
            "options[",
            vec![json!("already-checked"), json!("clicked")],
        );

        write(
            &session,
            &ExtractedContent::Choice(vec![ChoiceAnswer {
                question_index: 0,
                selected_options: vec![0, 1],
            }]),
            &Timeouts::default(),
        )
        .await
        .unwrap();

        // 两个选项各执行一次选择脚本
        let selects = session
            .eval_scripts()
            .into_iter()
            .filter(|s| s.contains("options["))
            .count();
        assert_eq!(selects, 2);
    }
}
