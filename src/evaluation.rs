//! 测评提交、结果等待与关卡推进
//!
//! 结果等待是标志轮询：成功与失败的标志集各自按优先级探测，先命中者
//! 定性。等待超时后还有一次补救检查——如果"下一关"按钮已经出现，
//! 说明实际已通过，只是结果提示没抓到。

use std::time::Duration;

use anyhow::Result;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::config::Timeouts;
use crate::descriptors;
use crate::error::AppError;
use crate::locator::{self, ProbeMode};
use crate::session::NavigableSession;

/// 结果标志的轮询间隔
const RESULT_POLL: Duration = Duration::from_millis(1_000);

/// 评价弹窗最长等待时间（通关后常驻出现，但非必然）
const POPUP_WAIT: Duration = Duration::from_secs(15);

/// 评价弹窗消失等待时间
const POPUP_DISMISS_WAIT: Duration = Duration::from_secs(5);

/// 点击下一关后的页面切换缓冲
const ADVANCE_SETTLE: Duration = Duration::from_secs(5);

/// 推进结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// 已进入下一关
    Advanced,
    /// 出现"完成"标志，实验全部结束
    Completed,
    /// 既没有下一关按钮也没有完成标志
    Unavailable,
}

/// 点击提交测评按钮
pub async fn submit(session: &dyn NavigableSession, timeouts: &Timeouts) -> Result<()> {
    info!("⏳ 点击测评按钮...");
    let clicked = locator::resolve_and_click(
        session,
        &descriptors::submit_button(),
        Duration::from_millis(timeouts.click_action),
        Duration::from_millis(timeouts.probe),
    )
    .await?;
    match clicked {
        Some(descriptor) => {
            info!("✅ 已点击测评 ({})", descriptor.kind);
            Ok(())
        }
        None => Err(AppError::Other("测评按钮不可见".to_string()).into()),
    }
}

/// 等待测评结果；返回是否通过
///
/// 超时不报错：先做一次下一关按钮补救检查，按钮在就判定通过，
/// 否则按未通过处理，由调用方决定下一步。
pub async fn wait_for_result(session: &dyn NavigableSession, timeouts: &Timeouts) -> Result<bool> {
    info!("⏳ 等待测评结果...");
    let deadline = Instant::now() + Duration::from_millis(timeouts.evaluation_wait);
    let success_markers = descriptors::success_markers();
    let failure_markers = descriptors::failure_markers();

    loop {
        for descriptor in &success_markers {
            if session.probe(descriptor, ProbeMode::Visible).await? {
                info!("✅ 测评通过！({})", descriptor.kind);
                return Ok(true);
            }
        }
        for descriptor in &failure_markers {
            if session.probe(descriptor, ProbeMode::Visible).await? {
                warn!("❌ 测评未通过 ({})", descriptor.kind);
                return Ok(false);
            }
        }
        if Instant::now() >= deadline {
            break;
        }
        sleep(RESULT_POLL).await;
    }

    // 超时补救：下一关按钮已出现则视为通过
    warn!("⚠️ 等待测评结果超时，检查下一关按钮...");
    let next_visible = locator::resolve(
        session,
        &descriptors::next_button(),
        ProbeMode::Visible,
        Duration::from_millis(timeouts.probe),
        Duration::from_millis(timeouts.probe),
    )
    .await?
    .is_some();
    if next_visible {
        info!("✅ (超时后检查) 发现下一关按钮，判定为通过");
        return Ok(true);
    }
    Ok(false)
}

/// 关闭评价弹窗并推进到下一关
pub async fn advance(session: &dyn NavigableSession, timeouts: &Timeouts) -> Result<AdvanceOutcome> {
    info!("⏳ 尝试进入下一关...");
    dismiss_rating_popup(session, timeouts).await?;

    // 完成标志优先于下一关按钮
    let completed = locator::resolve(
        session,
        &descriptors::complete_button(),
        ProbeMode::Visible,
        Duration::from_millis(timeouts.probe),
        Duration::from_millis(timeouts.probe),
    )
    .await?
    .is_some();
    if completed {
        info!("🎉 检测到 [完成] 标志，本实验已全部结束！");
        return Ok(AdvanceOutcome::Completed);
    }

    let clicked = locator::resolve_and_click(
        session,
        &descriptors::next_button(),
        Duration::from_millis(timeouts.click_action),
        Duration::from_millis(timeouts.probe),
    )
    .await?;
    match clicked {
        Some(descriptor) => {
            info!("👉 点击下一关 ({})", descriptor.kind);
            sleep(ADVANCE_SETTLE).await;
            info!("✅ 已进入下一关");
            Ok(AdvanceOutcome::Advanced)
        }
        None => {
            info!("ℹ️ 未找到可见的下一关按钮或完成标志");
            Ok(AdvanceOutcome::Unavailable)
        }
    }
}

/// 通关后的评价弹窗会遮挡下一关按钮，出现了就关掉
async fn dismiss_rating_popup(session: &dyn NavigableSession, timeouts: &Timeouts) -> Result<()> {
    info!("⏳ 等待评价弹窗出现...");
    let close = locator::resolve(
        session,
        &descriptors::rating_popup_close(),
        ProbeMode::Visible,
        POPUP_WAIT,
        Duration::from_millis(timeouts.probe),
    )
    .await?;

    let Some(close) = close else {
        info!("ℹ️ 等待弹窗超时 (可能未出现或已关闭)");
        return Ok(());
    };

    info!("ℹ️ 检测到评价弹窗，正在关闭...");
    // 等弹窗动画结束再点
    sleep(Duration::from_millis(500)).await;
    let _ = session.click(&close).await?;

    // 等待弹窗消失，避免遮罩层挡住后续点击
    let dismiss_deadline = Instant::now() + POPUP_DISMISS_WAIT;
    loop {
        let mut still_visible = false;
        for descriptor in descriptors::rating_popup().iter().chain(&[close.clone()]) {
            if session.probe(descriptor, ProbeMode::Visible).await? {
                still_visible = true;
                break;
            }
        }
        if !still_visible {
            info!("✅ 评价弹窗已关闭");
            break;
        }
        if Instant::now() >= dismiss_deadline {
            warn!("⚠️ 评价弹窗未在预期内消失，继续执行");
            break;
        }
        sleep(Duration::from_millis(500)).await;
    }
    sleep(Duration::from_millis(500)).await;
    Ok(())
}
