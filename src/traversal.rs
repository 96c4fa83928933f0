//! 双会话遍历状态机
//!
//! 把"找实验 → 开详情 → 进关卡 → 对齐第 1 关 → 逐关复制 → 返回列表"
//! 做成显式状态机。所有成对操作都是扇出-扇入：两个角色的动作一起发出，
//! 两边都落定后才分支，保证两个会话不会漂移到同一关卡的不同逻辑步骤。
//!
//! 关卡循环内的推进策略不对称：来源账号（已全通关）直接切换关卡最省事；
//! 目标账号要走"下一关"按钮，因为测评通过后有弹窗要处理，还可能出现
//! "完成"标志。两边各有对方的方式作为回退。

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::agent::SessionAgent;
use crate::config::Config;
use crate::evaluation::{self, AdvanceOutcome};
use crate::extractor::{self, ExtractedContent, SkipReason};
use crate::reporter::{LabStatus, LevelStatus, RunReporter, RunSummary};
use crate::utils::countdown_wait;

/// 返回列表后等待列表刷新的时间
const LIST_REFRESH_WAIT: Duration = Duration::from_secs(3);

/// 遍历状态
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// 在目标账号的列表里找第一个未完成实验
    FindLab,
    /// 双方并行打开该实验详情
    OpenDetail { lab_name: String },
    /// 双方进入关卡编辑器
    EnterLevel,
    /// 强制对齐到第 1 关
    SyncLevelOne,
    /// 逐关处理
    LevelLoop { level: usize },
    /// 返回课程列表
    ReturnToList,
    Done,
}

/// 单关处理的结果
enum LevelOutcome {
    /// 继续处理下一关
    Continue { next: usize },
    /// 本实验到此为止（状态已写入记录器）
    EndLab,
}

pub struct LabTraversal {
    source: SessionAgent,
    target: SessionAgent,
    config: Config,
    reporter: RunReporter,
}

impl LabTraversal {
    pub fn new(source: SessionAgent, target: SessionAgent, config: Config) -> Self {
        Self {
            source,
            target,
            config,
            reporter: RunReporter::new(),
        }
    }

    /// 驱动状态机直到没有未完成实验；无论成败都渲染总结报告
    pub async fn run(mut self) -> Result<RunSummary> {
        let outcome = self.drive().await;
        self.reporter.generate_report();
        outcome?;
        Ok(self.reporter.into_summary())
    }

    async fn drive(&mut self) -> Result<()> {
        let mut state = State::FindLab;
        let mut lab_count = 0usize;

        loop {
            state = match state {
                State::FindLab => {
                    lab_count += 1;
                    info!("📚 === 开始处理第 {} 个实验任务 ===", lab_count);
                    match self.find_incomplete_lab().await? {
                        Some(lab_name) => {
                            info!("🎯 目标起始实验: {}", lab_name);
                            self.reporter.start_experiment(&lab_name);
                            State::OpenDetail { lab_name }
                        }
                        None => {
                            info!("🎉 目标账号没有未完成的实验！");
                            State::Done
                        }
                    }
                }
                State::OpenDetail { lab_name } => {
                    // 两边任何一边进不了详情都是不可恢复的前置条件失败
                    let (source, target) = (&mut self.source, &mut self.target);
                    let (s, t) = tokio::join!(
                        source.open_lab_detail(&lab_name),
                        target.open_lab_detail(&lab_name)
                    );
                    s?;
                    t?;
                    State::EnterLevel
                }
                State::EnterLevel => {
                    let (source, target) = (&mut self.source, &mut self.target);
                    let (s, t) = tokio::join!(source.enter_level(), target.enter_level());
                    s?;
                    t?;
                    State::SyncLevelOne
                }
                State::SyncLevelOne => {
                    info!("⏳ 强制同步到第 1 关，确保两个账号在同一关卡...");
                    let (source, target) = (&mut self.source, &mut self.target);
                    let (s, t) =
                        tokio::join!(source.switch_to_level(1), target.switch_to_level(1));
                    if !s? {
                        warn!("⚠️ 来源账号未能确认第 1 关，继续执行");
                    }
                    if !t? {
                        warn!("⚠️ 目标账号未能确认第 1 关，继续执行");
                    }
                    State::LevelLoop { level: 1 }
                }
                State::LevelLoop { level } => {
                    info!("🔹 --- 当前处理第 {} 个任务 ---", level);
                    match self.process_level(level).await? {
                        LevelOutcome::Continue { next } => State::LevelLoop { level: next },
                        LevelOutcome::EndLab => State::ReturnToList,
                    }
                }
                State::ReturnToList => {
                    info!("🔙 正在返回课程列表，准备查找下一个实验...");
                    let direct = self.config.course_direct_url.clone();
                    let (source, target) = (&mut self.source, &mut self.target);
                    let (s, t) = tokio::join!(
                        source.navigate_to_course_with_relogin(direct.as_deref()),
                        target.navigate_to_course_with_relogin(direct.as_deref())
                    );
                    s?;
                    t?;
                    sleep(LIST_REFRESH_WAIT).await;
                    State::FindLab
                }
                State::Done => return Ok(()),
            };
        }
    }

    async fn find_incomplete_lab(&mut self) -> Result<Option<String>> {
        let labs = self.target.list_labs().await?;
        Ok(labs.into_iter().find(|lab| !lab.completed).map(|lab| lab.name))
    }

    /// 处理一个关卡：读来源 → 锁检查 → 跳过或复制 → 推进
    async fn process_level(&mut self, level: usize) -> Result<LevelOutcome> {
        let buffer = Duration::from_millis(self.config.timeouts.level_buffer);
        countdown_wait("开始处理当前关卡前缓冲", buffer).await;

        let content = extractor::read(self.source.session(), &self.config.timeouts).await?;

        // 目标账号被锁说明两边进度错位，本实验只能放弃
        if self.target.is_level_locked().await? {
            warn!("⚠️ 目标账号当前关卡未解锁，放弃本实验...");
            self.reporter.end_experiment(LabStatus::Locked);
            return Ok(LevelOutcome::EndLab);
        }

        if let ExtractedContent::Skip(reason) = &content {
            if *reason == SkipReason::LevelLocked {
                warn!("⚠️ 来源账号检测到关卡未解锁，放弃本实验...");
                self.reporter.end_experiment(LabStatus::Locked);
                return Ok(LevelOutcome::EndLab);
            }
            return self.skip_level(level, *reason).await;
        }

        // 写入 → 提交 → 等结果
        extractor::write(self.target.session(), &content, &self.config.timeouts).await?;
        evaluation::submit(self.target.session(), &self.config.timeouts).await?;
        let passed = evaluation::wait_for_result(self.target.session(), &self.config.timeouts).await?;

        if passed {
            self.reporter.record_level(level, LevelStatus::Passed, "");
            info!("✅ 测评通过，准备进入下一关或结束实验...");
        } else {
            warn!("❌ 测评失败，记录状态并尝试进入下一关...");
            self.reporter
                .record_level(level, LevelStatus::Failed, "测评未通过");
        }

        self.advance_both(level + 1).await
    }

    /// 跳过型关卡：不提交测评，双方直接强切下一关
    async fn skip_level(&mut self, level: usize, reason: SkipReason) -> Result<LevelOutcome> {
        info!(
            "⏭️ 当前关卡无需复制 ({})，准备跳过并进入下一关...",
            reason.as_str()
        );
        self.reporter
            .record_level(level, LevelStatus::Skipped, reason.as_str());

        let next = level + 1;
        let (source, target) = (&mut self.source, &mut self.target);
        let (source_switched, target_switched) =
            tokio::join!(source.switch_to_level(next), target.switch_to_level(next));
        let source_switched = source_switched?;

        if !target_switched? {
            // 切不动时还可能有普通的"下一关"按钮（阅读类关卡）
            info!("👉 无法直接切换关卡，尝试查找并点击 '下一关' 按钮...");
            let advanced =
                evaluation::advance(self.target.session(), &self.config.timeouts).await?;
            if advanced != AdvanceOutcome::Advanced {
                info!("🎉 当前实验已结束或全部跳过。");
                self.reporter.end_experiment(LabStatus::CompletedSkip);
                return Ok(LevelOutcome::EndLab);
            }
        }

        if !source_switched {
            debug!("⚠️ 来源账号未能切到第 {} 关 (跳过分支，忽略)", next);
        }

        countdown_wait(
            "进入下一关前缓冲",
            Duration::from_millis(self.config.timeouts.level_buffer),
        )
        .await;
        Ok(LevelOutcome::Continue { next })
    }

    /// 双方推进到下一关：来源直切，目标走"下一关"按钮，互为回退
    async fn advance_both(&mut self, next: usize) -> Result<LevelOutcome> {
        let (source_switched, target_advanced) = {
            let source = &mut self.source;
            let target_session = self.target.session();
            tokio::join!(
                source.switch_to_level(next),
                evaluation::advance(target_session, &self.config.timeouts)
            )
        };
        let source_switched = source_switched?;

        match target_advanced? {
            AdvanceOutcome::Completed => {
                info!("🎉 当前实验已全部完成！准备返回课程列表...");
                self.reporter.end_experiment(LabStatus::Completed);
                return Ok(LevelOutcome::EndLab);
            }
            AdvanceOutcome::Advanced => {}
            AdvanceOutcome::Unavailable => {
                // 测评失败时往往没有下一关按钮，退回直切
                info!("⚠️ 目标账号未找到下一关按钮，尝试强制切换关卡...");
                if !self.target.switch_to_level(next).await? {
                    info!("🎉 目标账号已无下一关，结束本实验。");
                    self.reporter.end_experiment(LabStatus::CompletedOrStuck);
                    return Ok(LevelOutcome::EndLab);
                }
            }
        }

        if !source_switched {
            warn!("⚠️ 来源账号无法切换到第 {} 关（可能已是最后一关）。", next);
            // 来源也试一下自己的"下一关"按钮，追不上也不算错
            info!("👉 尝试让来源账号点击 '下一关' 按钮作为备选...");
            let catch_up =
                evaluation::advance(self.source.session(), &self.config.timeouts).await?;
            self.reporter.record_divergence(format!(
                "来源账号未能切换到第 {} 关 (追赶结果: {:?})",
                next, catch_up
            )
            .as_str());

            if !self.config.tolerate_level_divergence {
                warn!("⚠️ 配置为不容忍进度分叉，结束本实验。");
                self.reporter.end_experiment(LabStatus::CompletedOrStuck);
                return Ok(LevelOutcome::EndLab);
            }
        }

        countdown_wait(
            "下一关加载完成后的缓冲",
            Duration::from_millis(self.config.timeouts.level_buffer),
        )
        .await;
        Ok(LevelOutcome::Continue { next })
    }
}
