//! 元素定位解析器
//!
//! 目标站点的页面结构随版本漂移且没有契约保证，任何语义元素都可能有
//! 多种 DOM 形态。这里把"通往同一个语义元素的多条路线"编码成按优先级
//! 排序的描述符列表，由一个解析器统一消费：按序探测，第一个命中即返回，
//! 后续描述符一律不再尝试。全部未命中返回 `None` 哨兵而不是错误，
//! 调用方据此选择领域内的回退策略。

use std::time::Duration;

use anyhow::Result;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::session::NavigableSession;

/// 探测模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// 要求元素可见（offsetParent 非空）
    Visible,
    /// 仅要求元素存在于 DOM 中
    Attached,
}

/// 元素描述符：结构化匹配器 + 语义标签
///
/// 不可变；列表顺序即优先级，先命中先赢，没有打分机制。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDescriptor {
    /// 语义标签，例如 "next-button"、"complete-marker"
    pub kind: &'static str,
    /// CSS 选择器
    pub selector: String,
    /// 可选的可见文本过滤（innerText 包含匹配）
    pub text_filter: Option<String>,
}

impl ElementDescriptor {
    pub fn new(kind: &'static str, selector: impl Into<String>) -> Self {
        Self {
            kind,
            selector: selector.into(),
            text_filter: None,
        }
    }

    pub fn with_text(
        kind: &'static str,
        selector: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            selector: selector.into(),
            text_filter: Some(text.into()),
        }
    }
}

/// 探测轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 按优先级解析元素
///
/// 依次探测 `descriptors`；每个描述符有一个短探测窗口 `probe_window`
/// （与外层 `timeout` 独立），窗口内轮询。第一个命中的描述符立即返回，
/// 之后的描述符不再探测。一轮全部未命中且外层超时未到时重复整轮，
/// 直到超时返回 `None`。
pub async fn resolve(
    session: &dyn NavigableSession,
    descriptors: &[ElementDescriptor],
    mode: ProbeMode,
    timeout: Duration,
    probe_window: Duration,
) -> Result<Option<ElementDescriptor>> {
    if descriptors.is_empty() {
        return Ok(None);
    }
    let deadline = Instant::now() + timeout;

    loop {
        for descriptor in descriptors {
            let probe_deadline = (Instant::now() + probe_window).min(deadline);
            loop {
                if session.probe(descriptor, mode).await? {
                    debug!("✓ 命中描述符: {} ({})", descriptor.kind, descriptor.selector);
                    return Ok(Some(descriptor.clone()));
                }
                if Instant::now() + POLL_INTERVAL > probe_deadline {
                    break;
                }
                sleep(POLL_INTERVAL).await;
            }
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// 解析并点击：命中第一个描述符后执行点击
///
/// 返回实际点中的描述符；未命中或点击失败返回 `None`。
pub async fn resolve_and_click(
    session: &dyn NavigableSession,
    descriptors: &[ElementDescriptor],
    timeout: Duration,
    probe_window: Duration,
) -> Result<Option<ElementDescriptor>> {
    match resolve(session, descriptors, ProbeMode::Visible, timeout, probe_window).await? {
        Some(descriptor) => {
            if session.click(&descriptor).await? {
                Ok(Some(descriptor))
            } else {
                Ok(None)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockSession;

    fn descriptors() -> Vec<ElementDescriptor> {
        vec![
            ElementDescriptor::new("first", ".a"),
            ElementDescriptor::new("second", ".b"),
            ElementDescriptor::new("third", ".c"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn first_match_short_circuits_rest() {
        let session = MockSession::new();
        session.set_probe("first", false);
        session.set_probe("second", true);
        session.set_probe("third", true);

        let hit = resolve(
            &session,
            &descriptors(),
            ProbeMode::Visible,
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert_eq!(hit.unwrap().kind, "second");
        // 命中 second 之后 third 绝不能被探测
        assert!(!session.probed_kinds().contains(&"third".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn no_match_returns_sentinel_not_error() {
        let session = MockSession::new();

        let hit = resolve(
            &session,
            &descriptors(),
            ProbeMode::Attached,
            Duration::from_millis(600),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert!(hit.is_none());
        // 三个描述符都至少探测过一次
        let probed = session.probed_kinds();
        assert!(probed.contains(&"first".to_string()));
        assert!(probed.contains(&"second".to_string()));
        assert!(probed.contains(&"third".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn late_appearance_is_picked_up_on_repeat_pass() {
        let session = MockSession::new();
        // 第一轮 false，之后 true
        session.set_probe_sequence("first", vec![false, false, false, true]);

        let hit = resolve(
            &session,
            &[ElementDescriptor::new("first", ".a")],
            ProbeMode::Visible,
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert_eq!(hit.unwrap().kind, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_list_is_not_found() {
        let session = MockSession::new();
        let hit = resolve(
            &session,
            &[],
            ProbeMode::Visible,
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_and_click_reports_click_target() {
        let session = MockSession::new();
        session.set_probe("second", true);

        let clicked = resolve_and_click(
            &session,
            &descriptors(),
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert_eq!(clicked.unwrap().kind, "second");
        assert_eq!(session.clicked_kinds(), vec!["second".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_click_is_reported_as_miss() {
        let session = MockSession::new();
        session.set_probe("first", true);
        session.set_click_result("first", false);

        let clicked = resolve_and_click(
            &session,
            &descriptors(),
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert!(clicked.is_none());
        assert_eq!(session.clicked_kinds(), vec!["first".to_string()]);
    }
}
