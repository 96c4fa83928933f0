/// 登录凭证
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// 各类操作超时（毫秒）
///
/// 超时都是针对单次操作的，不存在全局超时：某个操作卡住只会让该操作失败，
/// 由调用方决定重试、回退还是向上传播。
#[derive(Clone, Debug)]
pub struct Timeouts {
    /// 页面加载超时
    pub page_load: u64,
    /// 元素等待超时（定位解析器的外层超时）
    pub element_wait: u64,
    /// 单个描述符的短探测窗口
    pub probe: u64,
    /// 点击动作超时
    pub click_action: u64,
    /// 每关处理前后的缓冲等待
    pub level_buffer: u64,
    /// 测评结果等待超时
    pub evaluation_wait: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load: 20_000,
            element_wait: 10_000,
            probe: 3_000,
            click_action: 8_000,
            level_buffer: 2_000,
            evaluation_wait: 60_000,
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 平台首页/登录入口
    pub login_url: String,
    /// 课程名称（UI 导航时用于匹配课程卡片）
    pub course_name: String,
    /// 课程实验列表的直达链接（返回列表时优先使用）
    pub course_direct_url: Option<String>,
    /// 来源账号（已完成）凭证
    pub source: Credentials,
    /// 目标账号（未完成）凭证
    pub target: Credentials,
    /// 是否无头模式
    pub headless: bool,
    /// 超时配置
    pub timeouts: Timeouts,
    /// 来源/目标关卡进度出现分叉时是否容忍并继续
    ///
    /// 原始策略是"来源切换失败也继续推进目标"，这里做成显式开关，
    /// 且分叉会被记录进运行总结。
    pub tolerate_level_divergence: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login_url: "https://www.educoder.net/".to_string(),
            course_name: "机器学习".to_string(),
            course_direct_url: Some(
                "https://www.educoder.net/classrooms/4M9R2KEK/shixun_homework".to_string(),
            ),
            source: Credentials {
                username: String::new(),
                password: String::new(),
            },
            target: Credentials {
                username: String::new(),
                password: String::new(),
            },
            headless: false,
            timeouts: Timeouts::default(),
            tolerate_level_divergence: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            login_url: std::env::var("EDUCODER_LOGIN_URL").unwrap_or(default.login_url),
            course_name: std::env::var("EDUCODER_COURSE_NAME").unwrap_or(default.course_name),
            course_direct_url: std::env::var("EDUCODER_COURSE_URL")
                .ok()
                .or(default.course_direct_url),
            source: Credentials {
                username: std::env::var("EDUCODER_COMPLETE_USERNAME").unwrap_or_default(),
                password: std::env::var("EDUCODER_COMPLETE_PASSWORD").unwrap_or_default(),
            },
            target: Credentials {
                username: std::env::var("EDUCODER_USERNAME").unwrap_or_default(),
                password: std::env::var("EDUCODER_PASSWORD").unwrap_or_default(),
            },
            headless: std::env::var("BROWSER_HEADLESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.headless),
            timeouts: Timeouts {
                page_load: env_u64("TIMEOUT_PAGE_LOAD", default.timeouts.page_load),
                element_wait: env_u64("TIMEOUT_ELEMENT_WAIT", default.timeouts.element_wait),
                probe: env_u64("TIMEOUT_PROBE", default.timeouts.probe),
                click_action: env_u64("TIMEOUT_CLICK_TIMEOUT", default.timeouts.click_action),
                level_buffer: env_u64("TIMEOUT_LEVEL_WAIT", default.timeouts.level_buffer),
                evaluation_wait: env_u64(
                    "TIMEOUT_EVALUATION_WAIT",
                    default.timeouts.evaluation_wait,
                ),
            },
            tolerate_level_divergence: std::env::var("TOLERATE_LEVEL_DIVERGENCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.tolerate_level_divergence),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_are_sane() {
        let t = Timeouts::default();
        assert!(t.probe < t.element_wait);
        assert!(t.element_wait < t.evaluation_wait);
    }

    #[test]
    fn default_config_has_direct_url() {
        let config = Config::default();
        assert!(config.course_direct_url.is_some());
        assert!(config.tolerate_level_divergence);
    }
}
