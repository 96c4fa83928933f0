//! 元素描述符清单
//!
//! 站点上每个语义元素的候选路线集中在这里维护，按优先级排列：
//! 越靠前越精确（通常是带 hash 的原始类名），越靠后越宽泛。页面改版时
//! 只改这一个文件。Playwright 风格的 `:has-text()` 在这里拆成
//! 选择器 + 文本过滤两部分。

use crate::locator::ElementDescriptor;

/// 登录表单的用户名输入框
pub const LOGIN_USERNAME: &str = "#login";

/// 登录表单的密码输入框
pub const LOGIN_PASSWORD: &str = "#password";

/// 账号登录 Tab（登录页默认可能停在扫码登录）
pub fn login_account_tab() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::with_text("login-tab-btn", "div.ant-tabs-tab-btn", "账号登录"),
        ElementDescriptor::with_text("login-tab", ".ant-tabs-tab", "账号登录"),
    ]
}

/// 登录提交按钮
pub fn login_submit() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("submit-type", "button[type='submit']"),
        ElementDescriptor::with_text("submit-text", "button", "登录"),
        ElementDescriptor::new("submit-primary", "button.ant-btn-primary"),
    ]
}

/// 滑块验证码挂件
pub fn captcha_widget() -> Vec<ElementDescriptor> {
    vec![ElementDescriptor::new("geetest", ".geetest_widget")]
}

/// 登录失败提示
pub fn login_error_hint() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("form-explain", ".ant-form-explain"),
        ElementDescriptor::new("message-error", ".ant-message-error"),
    ]
}

/// 登录页仍然可见的标志（用于判定会话失效）
pub fn login_page_markers() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("password-input", "input[type='password']"),
        ElementDescriptor::with_text("account-tab", ".ant-tabs-tab", "账号登录"),
        ElementDescriptor::with_text("login-button", "button", "登录"),
    ]
}

/// 首页广告弹窗的关闭按钮
pub fn ad_popup_close() -> Vec<ElementDescriptor> {
    vec![ElementDescriptor::new("ad-close", ".close___PycHq")]
}

/// 首页上进入"我的课程"的入口
pub fn home_entry() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new(
            "dropdown-trigger",
            "section.ant-dropdown-trigger.height67___asp2E",
        ),
        ElementDescriptor::new("avatar", ".ant-avatar"),
        ElementDescriptor::with_text("my-courses-text", "a, span", "我的实训"),
        ElementDescriptor::new("nav-user", "li.nav-item > a[href*='/users/']"),
    ]
}

/// 按名称进入课程
pub fn course_entry(course_name: &str) -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::with_text("course-card-name", ".name___Fpf90", course_name),
        ElementDescriptor::with_text("course-link", "a", course_name),
        ElementDescriptor::with_text("course-text", "div, span, p", course_name),
    ]
}

/// 课程页加载完成的容器标志（任一命中即视为加载完成）
pub fn page_container() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("aside-container", "aside.edu-container"),
        ElementDescriptor::new("layout-content", "main.ant-layout-content"),
        ElementDescriptor::new("left-menu", "section.leftMenu___aMBG9"),
        ElementDescriptor::new("ant-layout", "div.ant-layout"),
    ]
}

/// 实训作业 Tab
pub fn lab_homework_tab() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::with_text("menu-item", "li.ant-menu-item", "实训作业"),
        ElementDescriptor::with_text("tab-text", "div", "实训作业"),
    ]
}

/// 作业列表上方的"全部"过滤 Tab
pub fn all_filter_tab() -> Vec<ElementDescriptor> {
    vec![ElementDescriptor::with_text("all-tab", "li.ant-menu-item", "全部")]
}

/// "提交中"过滤 Tab 存在时说明列表状态还在刷新
pub const SUBMITTING_TAB_TEXT: &str = "提交中";

/// 实验列表项的候选选择器（按精确度排序），供列表抓取 JS 使用
pub fn lab_item_selectors() -> Vec<&'static str> {
    vec![
        ".listItem___Kb3j3",
        "div[class*='listItem']",
        ".ant-list-item",
        ".ant-card",
        "tr.ant-table-row",
    ]
}

/// 列表项内表示"已完成"的图标
pub const COMPLETED_ICON: &str = ".iconfont.icon-yiwancheng1";

/// 按名称打开实验详情
pub fn lab_detail_entry(lab_name: &str) -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::with_text(
            "detail-link-named",
            "a[href*='detail?tabs=1']",
            lab_name,
        ),
        ElementDescriptor::new("detail-link", "a[href*='detail?tabs=1']"),
        ElementDescriptor::with_text("name-link", "a", lab_name),
    ]
}

/// 从详情页进入关卡编辑器
pub fn level_entry() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::with_text("continue-challenge", "p", "继续挑战"),
        ElementDescriptor::with_text("view-practice", "p", "查看实战"),
        ElementDescriptor::with_text("start-training", "a, button, p", "开始实训"),
        ElementDescriptor::with_text("continue-training", "a, button, p", "继续实训"),
        ElementDescriptor::new("right-menu", ".rightMenu___pcK7x"),
    ]
}

/// 编辑器已就绪的标志（存在即可，不要求可见）
pub fn editor_markers() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("monaco", ".monaco-editor"),
        ElementDescriptor::new("codemirror", ".CodeMirror"),
        ElementDescriptor::new("view-lines", ".view-lines"),
    ]
}

/// 打开任务抽屉的触发器
pub fn task_drawer_trigger() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("view-all-title", "a[title='查看全部任务']"),
        ElementDescriptor::new("list-icon", ".icon-gongnengliebiao"),
        ElementDescriptor::new("bars-icon", ".icon-bars"),
        ElementDescriptor::new("list-trigger", ".task-list-trigger"),
        ElementDescriptor::with_text("view-all-text", "a, span", "查看全部任务"),
    ]
}

/// 任务抽屉中的关卡项容器
pub const TASK_ITEM_CONTAINER: &str = ".task-item-container";

/// 提交测评按钮
pub fn submit_button() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("run-btn", ".btn-run___fh7pl"),
        ElementDescriptor::new("run-title", "button[title='运行评测']"),
        ElementDescriptor::with_text("eval-text", "button", "测评"),
        ElementDescriptor::with_text("submit-eval-text", "button", "提交评测"),
    ]
}

/// 测评成功标志
pub fn success_markers() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("success-msg", ".success-msg"),
        ElementDescriptor::with_text("congrats", "body", "恭喜"),
        ElementDescriptor::with_text("passed", "body", "通关"),
        ElementDescriptor::with_text("correct", "body", "正确"),
        ElementDescriptor::with_text("next-current", "a.current", "下一关"),
        ElementDescriptor::new("next-ghost", "a.ghost-link___Y8dGm"),
        ElementDescriptor::with_text("next-any", "a", "下一关"),
        ElementDescriptor::with_text("next-button", "button", "下一关"),
        ElementDescriptor::new("result-popup", ".evaluate-result-body"),
        ElementDescriptor::with_text("all-passed", ".test-result.success", "全部通过"),
    ]
}

/// 测评失败标志
pub fn failure_markers() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("error-msg", ".error-msg"),
        ElementDescriptor::with_text("failed", "body", "失败"),
        ElementDescriptor::with_text("wrong", "body", "错误"),
    ]
}

/// 下一关按钮
pub fn next_button() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("next-ghost", "a.ghost-link___Y8dGm"),
        ElementDescriptor::with_text("next-tc", "div.tc a", "下一关"),
        ElementDescriptor::with_text("next-current", "a.current", "下一关"),
        ElementDescriptor::with_text("next-any", "a", "下一关"),
        ElementDescriptor::with_text("next-button", "button", "下一关"),
    ]
}

/// 最后一关通过后的"完成"按钮
pub fn complete_button() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::with_text("complete-current", "a.current", "完成"),
        ElementDescriptor::with_text("complete-any", "a", "完成"),
    ]
}

/// 评价弹窗的关闭按钮（通关后必现）
pub fn rating_popup_close() -> Vec<ElementDescriptor> {
    vec![
        ElementDescriptor::new("close-line", "a.close-line"),
        ElementDescriptor::new("round-close", ".icon-roundclose"),
    ]
}

/// 评价弹窗本体（用于等待它消失）
pub fn rating_popup() -> Vec<ElementDescriptor> {
    vec![ElementDescriptor::new("result-popup", ".evaluate-result-body")]
}

/// 关卡锁定的页面文案
pub const LOCKED_TEXTS: [&str; 2] = ["完成上一关才能解锁", "上一关未完成"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_button_prefers_hashed_class() {
        let list = next_button();
        assert_eq!(list[0].kind, "next-ghost");
        assert!(list[0].text_filter.is_none());
        assert_eq!(list[1].text_filter.as_deref(), Some("下一关"));
    }

    #[test]
    fn course_entry_carries_requested_name() {
        let list = course_entry("机器学习");
        assert!(list
            .iter()
            .all(|d| d.text_filter.as_deref() == Some("机器学习")));
    }

    #[test]
    fn lab_item_selectors_go_from_specific_to_generic() {
        let list = lab_item_selectors();
        assert_eq!(list[0], ".listItem___Kb3j3");
        assert_eq!(*list.last().unwrap(), "tr.ant-table-row");
    }
}
