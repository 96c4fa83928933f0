//! 单账号会话代理
//!
//! 一个 `SessionAgent` 绑定一个角色、一套凭证和一个顶层会话，封装该账号
//! 的全部页面流程：登录、进课程、扫实验列表、开详情、进关卡、切关卡。
//! 双账号编排在 `traversal` 中完成，这里只关心单边。

use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{Config, Credentials};
use crate::descriptors;
use crate::error::{is_session_expired, AppError};
use crate::locator::{self, ElementDescriptor, ProbeMode};
use crate::session::{NavigableSession, Role};
use crate::utils::mask_identifier;

/// 登录结果分类的等待上限
const LOGIN_CHECK_WAIT: Duration = Duration::from_secs(30);

/// 验证码人工处理的等待上限
const CAPTCHA_WAIT: Duration = Duration::from_secs(60);

/// 密码错误后留给人工修正的时间
const ERROR_GRACE: Duration = Duration::from_secs(30);

/// 登录最终确认的等待上限
const LOGIN_FINAL_WAIT: Duration = Duration::from_secs(60);

/// 打开详情/新标签页的等待上限
const DETAIL_WAIT: Duration = Duration::from_secs(8);

/// 登录状态检查的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginCheck {
    Success,
    Error,
    Captcha,
    Timeout,
}

/// 实验列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabSummary {
    pub name: String,
    pub completed: bool,
}

pub struct SessionAgent {
    role: Role,
    credentials: Credentials,
    config: Config,
    session: Box<dyn NavigableSession>,
}

impl SessionAgent {
    pub fn new(
        role: Role,
        credentials: Credentials,
        config: Config,
        session: Box<dyn NavigableSession>,
    ) -> Self {
        Self {
            role,
            credentials,
            config,
            session,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session(&self) -> &dyn NavigableSession {
        self.session.as_ref()
    }

    fn probe_window(&self) -> Duration {
        Duration::from_millis(self.config.timeouts.probe)
    }

    fn element_wait(&self) -> Duration {
        Duration::from_millis(self.config.timeouts.element_wait)
    }

    /// 登录该账号
    pub async fn login(&mut self) -> Result<()> {
        let masked = mask_identifier(&self.credentials.username);
        info!("{} 👤 正在登录用户: {}", self.role.label(), masked);

        // 不在登录页时先回到入口
        let url = self.session.current_url().await?;
        if !url.contains("/login") && !url.contains("/passport") {
            self.session.navigate(&self.config.login_url).await?;
        } else {
            info!("{} ℹ️ 当前已在登录页面，直接进行登录操作", self.role.label());
        }

        // 默认 Tab 可能是扫码登录
        let tab = locator::resolve_and_click(
            self.session.as_ref(),
            &descriptors::login_account_tab(),
            Duration::from_secs(5),
            self.probe_window(),
        )
        .await?;
        if tab.is_some() {
            info!("{} 👉 切换到 '账号登录' 模式...", self.role.label());
            sleep(Duration::from_millis(500)).await;
        }

        // 等待表单就绪
        let form = locator::resolve(
            self.session.as_ref(),
            &[ElementDescriptor::new(
                "login-input",
                descriptors::LOGIN_USERNAME,
            )],
            ProbeMode::Visible,
            self.element_wait(),
            self.probe_window(),
        )
        .await?;
        if form.is_none() {
            return Err(AppError::login_failed(self.role, "登录表单未出现").into());
        }
        info!("{} ✅ 登录表单已就绪", self.role.label());

        info!("{} ⏳ 输入用户名和密码...", self.role.label());
        self.session
            .fill(descriptors::LOGIN_USERNAME, &self.credentials.username)
            .await?;
        self.session
            .fill(descriptors::LOGIN_PASSWORD, &self.credentials.password)
            .await?;
        sleep(Duration::from_millis(800)).await;

        let clicked = locator::resolve_and_click(
            self.session.as_ref(),
            &descriptors::login_submit(),
            self.element_wait(),
            self.probe_window(),
        )
        .await?;
        if clicked.is_none() {
            return Err(AppError::login_failed(self.role, "登录按钮不可点击").into());
        }

        // 分类登录结果
        info!("{} ⏳ 检查登录结果...", self.role.label());
        match self.classify_login_result().await? {
            LoginCheck::Success => {}
            LoginCheck::Captcha => {
                warn!(
                    "{} ⚠️ 检测到验证码！请在浏览器中手动完成验证...",
                    self.role.label()
                );
                self.wait_captcha_resolved().await?;
            }
            LoginCheck::Error => {
                let hint = self.login_error_text().await;
                warn!("{} ❌ 检测到登录错误提示: {}", self.role.label(), hint);
                warn!("{} ⚠️ 请手动修正账号密码并登录...", self.role.label());
                sleep(ERROR_GRACE).await;
            }
            LoginCheck::Timeout => {
                warn!("{} ⚠️ 登录结果检查超时，进入最终确认...", self.role.label());
            }
        }

        // 最终确认
        info!("{} ⏳ 最终验证登录状态...", self.role.label());
        let deadline = Instant::now() + LOGIN_FINAL_WAIT;
        loop {
            if self.looks_logged_in().await? {
                info!("{} ✅ 验证通过：登录成功", self.role.label());
                // 等 Cookie 落地
                sleep(Duration::from_secs(2)).await;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::login_failed(self.role, "登录最终确认超时").into());
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    async fn classify_login_result(&self) -> Result<LoginCheck> {
        let deadline = Instant::now() + LOGIN_CHECK_WAIT;
        let avatar = ElementDescriptor::new("avatar", ".ant-avatar");
        let captcha = descriptors::captcha_widget();
        let errors = descriptors::login_error_hint();
        loop {
            let url = self.session.current_url().await?;
            if !url.is_empty() && !url.contains("login") && !url.contains("passport") {
                return Ok(LoginCheck::Success);
            }
            if self.session.probe(&avatar, ProbeMode::Visible).await? {
                return Ok(LoginCheck::Success);
            }
            for descriptor in &captcha {
                if self.session.probe(descriptor, ProbeMode::Visible).await? {
                    return Ok(LoginCheck::Captcha);
                }
            }
            for descriptor in &errors {
                if self.session.probe(descriptor, ProbeMode::Visible).await? {
                    return Ok(LoginCheck::Error);
                }
            }
            if Instant::now() >= deadline {
                return Ok(LoginCheck::Timeout);
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// 等待验证码被人工处理完（挂件消失或出现登录成功迹象）
    async fn wait_captcha_resolved(&self) -> Result<()> {
        let deadline = Instant::now() + CAPTCHA_WAIT;
        let captcha = descriptors::captcha_widget();
        loop {
            let mut widget_visible = false;
            for descriptor in &captcha {
                if self.session.probe(descriptor, ProbeMode::Visible).await? {
                    widget_visible = true;
                    break;
                }
            }
            if !widget_visible || self.looks_logged_in().await? {
                info!(
                    "{} ✅ 验证码处理可能已完成，继续等待跳转...",
                    self.role.label()
                );
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("{} ⚠️ 验证码等待超时，继续执行", self.role.label());
                return Ok(());
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    async fn login_error_text(&self) -> String {
        let js = r#"(window, document) => {
  const el = document.querySelector('.ant-form-explain, .ant-message-error');
  return el ? el.innerText : '';
}"#;
        match self.session.evaluate(js).await {
            Ok(value) => value.as_str().unwrap_or("").to_string(),
            Err(_) => String::new(),
        }
    }

    async fn looks_logged_in(&self) -> Result<bool> {
        let url = self.session.current_url().await?;
        if !url.is_empty() && !url.contains("login") && !url.contains("passport") {
            return Ok(true);
        }
        let avatar = ElementDescriptor::new("avatar", ".ant-avatar");
        if self.session.probe(&avatar, ProbeMode::Visible).await? {
            return Ok(true);
        }
        let my_courses = ElementDescriptor::with_text("my-courses", "a, span", "我的实训");
        self.session.probe(&my_courses, ProbeMode::Visible).await
    }

    /// 导航到课程的实验列表页
    ///
    /// 给了直达链接就先试直达；重定向回登录页或页面上出现登录组件时
    /// 返回 `SessionExpired`，由调用方决定重新登录。
    pub async fn navigate_to_course(&mut self, direct_url: Option<&str>) -> Result<()> {
        if let Some(url) = direct_url {
            info!("{} ⏳ 检测到直达链接，正在跳转: {}", self.role.label(), url);
            self.session.navigate(url).await?;
            if self.session_expired().await? {
                return Err(AppError::SessionExpired { role: self.role }.into());
            }
            if self.wait_page_container().await? {
                info!("{} ✅ 直达跳转成功", self.role.label());
                return Ok(());
            }
            warn!("{} ⚠️ 直达跳转失败，回退到 UI 导航...", self.role.label());
        }

        self.navigate_via_ui().await
    }

    /// 带重登录的课程导航：会话失效时登录一次再重试
    pub async fn navigate_to_course_with_relogin(
        &mut self,
        direct_url: Option<&str>,
    ) -> Result<()> {
        match self.navigate_to_course(direct_url).await {
            Ok(()) => Ok(()),
            Err(e) if is_session_expired(&e) => {
                warn!(
                    "{} ⚠️ 检测到会话失效 (用户: {})，正在重新登录...",
                    self.role.label(),
                    mask_identifier(&self.credentials.username)
                );
                self.login().await?;
                self.navigate_to_course(direct_url).await
            }
            Err(e) => Err(e),
        }
    }

    async fn navigate_via_ui(&mut self) -> Result<()> {
        // 广告弹窗挡路就关掉，关不掉不致命
        let ad = locator::resolve_and_click(
            self.session.as_ref(),
            &descriptors::ad_popup_close(),
            self.probe_window(),
            self.probe_window(),
        )
        .await?;
        if ad.is_some() {
            info!("{} ✅ 广告弹窗已关闭", self.role.label());
            sleep(Duration::from_secs(1)).await;
        }

        info!("{} ⏳ 进入个人主页...", self.role.label());
        let home = locator::resolve_and_click(
            self.session.as_ref(),
            &descriptors::home_entry(),
            Duration::from_secs(3),
            self.probe_window(),
        )
        .await?;
        match home {
            Some(descriptor) => {
                info!("{} ✅ 成功点击: {}", self.role.label(), descriptor.kind);
                sleep(Duration::from_secs(1)).await;
            }
            None => warn!(
                "{} ⚠️ 无法通过点击进入个人主页，尝试直接查找课程...",
                self.role.label()
            ),
        }

        let course_name = self.config.course_name.clone();
        info!("{} ⏳ 进入课程: {}...", self.role.label(), course_name);
        let clicked = locator::resolve_and_click(
            self.session.as_ref(),
            &descriptors::course_entry(&course_name),
            self.element_wait(),
            self.probe_window(),
        )
        .await?;
        if clicked.is_none() {
            return Err(AppError::navigation_failed(
                self.role,
                "进入课程",
                format!("无法找到或点击课程: {}", course_name),
            )
            .into());
        }

        // 课程可能在新标签页打开
        if self.session.adopt_new_session(Duration::from_secs(3)).await? {
            info!("{} ✅ 检测到新标签页打开，切换页面上下文...", self.role.label());
        }

        if !self.wait_page_container().await? {
            warn!("{} ⚠️ 实验列表页面加载超时，尝试继续执行...", self.role.label());
        }
        sleep(Duration::from_secs(1)).await;
        info!("{} ✅ 成功进入课程页面", self.role.label());
        Ok(())
    }

    /// 会话失效判定：回到登录页，或当前页面上出现登录组件
    async fn session_expired(&self) -> Result<bool> {
        let url = self.session.current_url().await?;
        if url.contains("login") || url.contains("passport") {
            return Ok(true);
        }
        for descriptor in &descriptors::login_page_markers() {
            if self.session.probe(descriptor, ProbeMode::Visible).await? {
                warn!(
                    "{} ⚠️ 检测到页面包含登录元素，判断为需要登录",
                    self.role.label()
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn wait_page_container(&self) -> Result<bool> {
        debug!("{} ⏳ 等待实验列表页面容器加载...", self.role.label());
        let hit = locator::resolve(
            self.session.as_ref(),
            &descriptors::page_container(),
            ProbeMode::Visible,
            self.element_wait(),
            self.probe_window(),
        )
        .await?;
        Ok(hit.is_some())
    }

    /// 扫描实验列表，带完成状态
    pub async fn list_labs(&mut self) -> Result<Vec<LabSummary>> {
        info!("{} ⏳ 查找所有实验项目...", self.role.label());

        // React 列表偶尔渲染不全，刷新一次
        debug!("{} 🔄 刷新页面以确保列表完全渲染...", self.role.label());
        let _ = self
            .session
            .evaluate("(window, document) => { window.location.reload(); }")
            .await;
        sleep(Duration::from_secs(2)).await;

        // 实训作业 Tab + "全部" 过滤器
        let tab = locator::resolve_and_click(
            self.session.as_ref(),
            &descriptors::lab_homework_tab(),
            Duration::from_secs(5),
            self.probe_window(),
        )
        .await?;
        if tab.is_some() {
            info!("{} ✅ 已点击 '实训作业' 标签页", self.role.label());
            sleep(Duration::from_secs(1)).await;
            let all = locator::resolve_and_click(
                self.session.as_ref(),
                &descriptors::all_filter_tab(),
                Duration::from_secs(3),
                self.probe_window(),
            )
            .await?;
            if all.is_some() {
                info!("{} ✅ 已点击 '全部' 按钮", self.role.label());
            }
            sleep(Duration::from_secs(2)).await;
        }

        let mut labs = self.scrape_labs().await?;

        // 列表为空时可能停在"提交中"之类的过滤器上
        if labs.is_empty() {
            warn!(
                "{} ⚠️ 未找到任何实验项目，尝试切换到'{}'选项卡...",
                self.role.label(),
                descriptors::SUBMITTING_TAB_TEXT
            );
            let submitting = ElementDescriptor::with_text(
                "submitting-tab",
                ".ant-menu-item",
                descriptors::SUBMITTING_TAB_TEXT,
            );
            if self.session.click(&submitting).await? {
                sleep(Duration::from_secs(2)).await;
                labs = self.scrape_labs().await?;
            }
        }

        let completed = labs.iter().filter(|l| l.completed).count();
        info!(
            "{} 📊 实验统计: 总数 {} | ✅ 已完成 {} | ⭕ 未完成 {}",
            self.role.label(),
            labs.len(),
            completed,
            labs.len() - completed
        );
        Ok(labs)
    }

    async fn scrape_labs(&self) -> Result<Vec<LabSummary>> {
        for selector in descriptors::lab_item_selectors() {
            let raw = self.session.evaluate(&scrape_labs_js(selector)).await?;
            let labs: Vec<LabSummary> = serde_json::from_value(raw).unwrap_or_default();
            if !labs.is_empty() {
                debug!(
                    "{} ✅ 列表策略 {} 命中，找到 {} 个元素",
                    self.role.label(),
                    selector,
                    labs.len()
                );
                return Ok(labs);
            }
        }
        Ok(Vec::new())
    }

    /// 按名称打开实验详情页
    pub async fn open_lab_detail(&mut self, lab_name: &str) -> Result<()> {
        info!("{} ⏳ 打开实验详情: {}", self.role.label(), lab_name);

        for descriptor in descriptors::lab_detail_entry(lab_name) {
            let clicked = locator::resolve_and_click(
                self.session.as_ref(),
                &[descriptor.clone()],
                self.probe_window(),
                self.probe_window(),
            )
            .await?;
            if clicked.is_none() {
                continue;
            }
            debug!("{} ⏳ 已点击: {}", self.role.label(), descriptor.kind);

            // 详情可能在新标签页打开
            let _ = self.session.adopt_new_session(DETAIL_WAIT).await?;

            if self.wait_url_contains("detail", DETAIL_WAIT).await? {
                let url = self.session.current_url().await?;
                info!("{} ✅ 已进入详情页: {}", self.role.label(), url);
                return Ok(());
            }
            debug!(
                "{} ⚠️ URL 未匹配详情页，继续尝试其他策略",
                self.role.label()
            );
        }

        Err(AppError::navigation_failed(self.role, "打开实验详情", "无法进入实验详情页").into())
    }

    async fn wait_url_contains(&self, needle: &str, wait: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.session.current_url().await?.contains(needle) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// 从详情页进入关卡编辑器
    ///
    /// 已经在编辑器页面时什么都不做；找不到入口按钮也不报错，
    /// 假设无需点击。
    pub async fn enter_level(&mut self) -> Result<()> {
        let in_editor = locator::resolve(
            self.session.as_ref(),
            &descriptors::editor_markers(),
            ProbeMode::Attached,
            self.probe_window(),
            self.probe_window(),
        )
        .await?
        .is_some();
        if in_editor {
            return Ok(());
        }

        let clicked = locator::resolve_and_click(
            self.session.as_ref(),
            &descriptors::level_entry(),
            self.element_wait(),
            self.probe_window(),
        )
        .await?;
        match clicked {
            Some(descriptor) => {
                info!(
                    "{} ✅ 点击关卡入口: {}",
                    self.role.label(),
                    descriptor.kind
                );
                // 关卡编辑器通常在新标签页打开
                let _ = self.session.adopt_new_session(Duration::from_secs(5)).await?;
                sleep(Duration::from_secs(5)).await;
            }
            None => warn!(
                "{} ⚠️ 未找到明显的入口按钮，假设已在详情页或无需点击",
                self.role.label()
            ),
        }
        Ok(())
    }

    /// 切换到指定关卡（从 1 开始计数）；返回是否已处于/成功切到该关
    pub async fn switch_to_level(&mut self, level: usize) -> Result<bool> {
        // 页面标题已经是目标关卡时不动
        let already = self
            .session
            .evaluate(&heading_matches_js(level))
            .await?
            .as_bool()
            .unwrap_or(false);
        if already {
            debug!(
                "{} ✅ 页面标题已是第 {} 关，无需切换",
                self.role.label(),
                level
            );
            return Ok(true);
        }

        self.ensure_task_drawer_open().await?;

        let raw = self.session.evaluate(&scrape_tasks_js()).await?;
        let items: Vec<TaskItem> = serde_json::from_value(raw).unwrap_or_default();
        if items.is_empty() {
            warn!(
                "{} ⚠️ 未找到任务列表 ({})",
                self.role.label(),
                descriptors::TASK_ITEM_CONTAINER
            );
            return Ok(false);
        }

        // 文本匹配："N. 名称" 或 "第N关"；避免 "1." 误配 "11."
        let pattern = level_pattern(level);
        for (index, item) in items.iter().enumerate() {
            if pattern.is_match(&item.text) {
                if item.active {
                    debug!("{} ✅ 已在第 {} 关", self.role.label(), level);
                    return Ok(true);
                }
                info!(
                    "{} 👉 点击第 {} 关任务项 (\"{}\")...",
                    self.role.label(),
                    level,
                    first_line(&item.text)
                );
                self.click_task_item(index).await?;
                return Ok(true);
            }
        }

        // 位置回退：假设列表顺序即关卡顺序
        if items.len() >= level {
            let target = &items[level - 1];
            if level > 1 && level_pattern(1).is_match(&target.text) {
                warn!(
                    "{} ❌ (安全拦截) 试图通过索引点击第 {} 关，但目标项文本疑似第 1 关: \"{}\"",
                    self.role.label(),
                    level,
                    first_line(&target.text)
                );
                return Ok(false);
            }
            info!(
                "{} 👉 (位置回退) 点击第 {} 个任务项...",
                self.role.label(),
                level
            );
            self.click_task_item(level - 1).await?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn ensure_task_drawer_open(&self) -> Result<()> {
        let container = ElementDescriptor::new("task-items", descriptors::TASK_ITEM_CONTAINER);
        if self.session.probe(&container, ProbeMode::Visible).await? {
            return Ok(());
        }
        debug!("{} ℹ️ 任务列表不可见，尝试打开任务抽屉...", self.role.label());
        let trigger = locator::resolve_and_click(
            self.session.as_ref(),
            &descriptors::task_drawer_trigger(),
            self.probe_window(),
            self.probe_window(),
        )
        .await?;
        if trigger.is_some() {
            // 等抽屉展开
            let _ = locator::resolve(
                self.session.as_ref(),
                &[container],
                ProbeMode::Visible,
                Duration::from_secs(5),
                self.probe_window(),
            )
            .await?;
        }
        Ok(())
    }

    async fn click_task_item(&self, index: usize) -> Result<()> {
        let clicked = self
            .session
            .evaluate(&click_task_js(index))
            .await?
            .as_bool()
            .unwrap_or(false);
        if !clicked {
            warn!("{} ⚠️ 任务项 {} 点击失败", self.role.label(), index + 1);
        }
        sleep(Duration::from_millis(self.config.timeouts.level_buffer)).await;
        Ok(())
    }

    /// 当前关卡是否被锁定（需先完成上一关）
    pub async fn is_level_locked(&self) -> Result<bool> {
        let body = self.session.body_text().await?;
        Ok(descriptors::LOCKED_TEXTS
            .iter()
            .any(|text| body.contains(text)))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TaskItem {
    text: String,
    active: bool,
}

fn level_pattern(level: usize) -> Regex {
    // 两个分支：行首/空白后的 "N."，或 "第N关"
    Regex::new(&format!(r"(^|\s){level}\.|第{level}关"))
        .unwrap_or_else(|_| Regex::new(r"$^").unwrap())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

fn scrape_labs_js(selector: &str) -> String {
    let selector = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    let icon = descriptors::COMPLETED_ICON;
    format!(
        r#"(window, document) => {{
  const items = Array.from(document.querySelectorAll({selector}));
  return items.map((item) => {{
    let name = '';
    const title = item.querySelector('.name___CCaOX');
    if (title) {{
      name = title.innerText;
    }} else {{
      const backup = item.querySelector('h3, .name, .title, a[title]');
      name = backup ? backup.innerText : (item.innerText || '').split('\n')[0];
    }}
    return {{
      name: name.trim(),
      completed: item.querySelectorAll('{icon}').length > 0,
    }};
  }}).filter((lab) => lab.name.length > 0);
}}"#
    )
}

fn heading_matches_js(level: usize) -> String {
    format!(
        r#"(window, document) => {{
  const headings = Array.from(document.querySelectorAll('h3'));
  return headings.some((h) => h.offsetParent !== null && h.innerText.includes('第{level}关'));
}}"#
    )
}

fn scrape_tasks_js() -> String {
    r#"(window, document) => {
  const items = Array.from(document.querySelectorAll('.task-item-container'));
  return items.map((item) => {
    const link = item.querySelector('a');
    return {
      text: (link ? link.innerText : item.innerText) || '',
      active: (item.getAttribute('class') || '').includes('active'),
    };
  });
}"#
    .to_string()
}

fn click_task_js(index: usize) -> String {
    format!(
        r#"(window, document) => {{
  const items = document.querySelectorAll('.task-item-container');
  const item = items[{index}];
  if (!item) {{ return false; }}
  const link = item.querySelector('a');
  (link || item).click();
  return true;
}}"#
    )
}
