//! 运行记录与总结报告
//!
//! 记录是只追加的：每个实验一条记录，关卡结果按发生顺序追加，
//! 进度分叉单独记一笔。报告在运行结束时渲染，运行中途出错也要渲染
//! 已有的部分。

use chrono::{DateTime, Local};
use tracing::info;

/// 实验的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabStatus {
    /// 仍在处理（未正常收尾）
    InProgress,
    /// 因关卡锁定而放弃
    Locked,
    /// 全部关卡正常结束
    Completed,
    /// 跳过型关卡收尾（无测评流程）
    CompletedSkip,
    /// 无法继续推进，视为结束
    CompletedOrStuck,
}

impl LabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabStatus::InProgress => "IN_PROGRESS",
            LabStatus::Locked => "LOCKED",
            LabStatus::Completed => "COMPLETED",
            LabStatus::CompletedSkip => "COMPLETED_SKIP",
            LabStatus::CompletedOrStuck => "COMPLETED_OR_STUCK",
        }
    }
}

/// 单个关卡的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelStatus {
    Passed,
    Failed,
    Skipped,
}

/// 关卡记录
#[derive(Debug, Clone)]
pub struct LevelRecord {
    pub index: usize,
    pub status: LevelStatus,
    pub details: String,
    pub timestamp: DateTime<Local>,
}

/// 实验记录
#[derive(Debug, Clone)]
pub struct LabRecord {
    pub name: String,
    pub status: LabStatus,
    pub levels: Vec<LevelRecord>,
    /// 来源/目标进度分叉的说明
    pub divergences: Vec<String>,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
}

impl LabRecord {
    fn count(&self, status: LevelStatus) -> usize {
        self.levels.iter().filter(|l| l.status == status).count()
    }

    fn duration_label(&self) -> String {
        match self.end_time {
            Some(end) => {
                let secs = (end - self.start_time).num_milliseconds() as f64 / 1000.0;
                format!("{:.1}s", secs)
            }
            None => "未完成".to_string(),
        }
    }
}

/// 运行总结（报告的结构化形式）
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub labs: Vec<LabRecord>,
}

impl RunSummary {
    pub fn total_passed(&self) -> usize {
        self.labs
            .iter()
            .map(|lab| lab.count(LevelStatus::Passed))
            .sum()
    }

    pub fn total_failed(&self) -> usize {
        self.labs
            .iter()
            .map(|lab| lab.count(LevelStatus::Failed))
            .sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.labs
            .iter()
            .map(|lab| lab.count(LevelStatus::Skipped))
            .sum()
    }
}

/// 运行记录器
#[derive(Debug, Default)]
pub struct RunReporter {
    labs: Vec<LabRecord>,
}

impl RunReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开启一个新实验的记录
    pub fn start_experiment(&mut self, name: &str) {
        self.labs.push(LabRecord {
            name: name.to_string(),
            status: LabStatus::InProgress,
            levels: Vec::new(),
            divergences: Vec::new(),
            start_time: Local::now(),
            end_time: None,
        });
    }

    /// 收尾当前实验
    pub fn end_experiment(&mut self, status: LabStatus) {
        if let Some(lab) = self.labs.last_mut() {
            lab.status = status;
            lab.end_time = Some(Local::now());
        }
    }

    /// 追加一条关卡记录
    pub fn record_level(&mut self, index: usize, status: LevelStatus, details: &str) {
        if let Some(lab) = self.labs.last_mut() {
            lab.levels.push(LevelRecord {
                index,
                status,
                details: details.to_string(),
                timestamp: Local::now(),
            });
        }
    }

    /// 记录一次来源/目标进度分叉
    pub fn record_divergence(&mut self, detail: &str) {
        if let Some(lab) = self.labs.last_mut() {
            lab.divergences.push(detail.to_string());
        }
    }

    /// 渲染运行总结到日志
    pub fn generate_report(&self) {
        info!("📊 === 本次运行总结 ===");
        if self.labs.is_empty() {
            info!("无实验记录。");
            return;
        }

        for (i, lab) in self.labs.iter().enumerate() {
            info!(
                "{}. 实验: {} [{}] (耗时: {})",
                i + 1,
                lab.name,
                lab.status.as_str(),
                lab.duration_label()
            );
            info!(
                "   - 关卡统计: ✅ 通过 {} | ❌ 失败 {} | ⏭️ 跳过 {}",
                lab.count(LevelStatus::Passed),
                lab.count(LevelStatus::Failed),
                lab.count(LevelStatus::Skipped)
            );
            for level in lab.levels.iter().filter(|l| l.status == LevelStatus::Failed) {
                info!("     • 第 {} 关: {}", level.index, level.details);
            }
            for divergence in &lab.divergences {
                info!("   - ⚠️ 进度分叉: {}", divergence);
            }
        }
        info!("========================");
    }

    /// 转成结构化总结
    pub fn into_summary(self) -> RunSummary {
        RunSummary { labs: self.labs }
    }
}
