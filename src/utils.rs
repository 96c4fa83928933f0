//! 通用工具函数

use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

/// 脱敏显示账号标识（手机号 / 邮箱 / 其他）
pub fn mask_identifier(id: &str) -> String {
    if id.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = id.chars().collect();
    if chars.len() == 11 && chars.iter().all(|c| c.is_ascii_digit()) {
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        return format!("{}****{}", head, tail);
    }
    if let Some(at) = id.find('@') {
        let (local, domain) = id.split_at(at);
        let local_chars: Vec<char> = local.chars().collect();
        let masked_local = match local_chars.len() {
            0 => "*".to_string(),
            1 | 2 => format!("{}*", local_chars[0]),
            _ => format!("{}***", local_chars[..2].iter().collect::<String>()),
        };
        return format!("{}{}", masked_local, domain);
    }
    if chars.len() <= 2 {
        return format!("*{}", chars[chars.len() - 1]);
    }
    format!(
        "{}***{}",
        chars[0],
        chars[chars.len() - 1]
    )
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 带倒计时日志的缓冲等待
pub async fn countdown_wait(label: &str, duration: Duration) {
    let total_seconds = (duration.as_millis() as u64).div_ceil(1000).max(1);
    info!(
        "⏱ {}，总等待: {}ms ({}s)",
        label,
        duration.as_millis(),
        total_seconds
    );
    for s in (1..=total_seconds).rev() {
        info!("⏳ 倒计时: {}s", s);
        sleep(Duration::from_secs(1)).await;
    }
    info!("✅ 等待结束");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_phone_number() {
        assert_eq!(mask_identifier("13812345678"), "138****5678");
    }

    #[test]
    fn mask_email() {
        assert_eq!(mask_identifier("student@example.com"), "st***@example.com");
        assert_eq!(mask_identifier("a@b.cn"), "a*@b.cn");
    }

    #[test]
    fn mask_email_with_empty_local_part() {
        // 环境变量里填错的账号也不能让脱敏崩溃
        assert_eq!(mask_identifier("@example.com"), "*@example.com");
    }

    #[test]
    fn mask_generic_and_short() {
        assert_eq!(mask_identifier("zhangsan"), "z***n");
        assert_eq!(mask_identifier("ab"), "*b");
        assert_eq!(mask_identifier(""), "");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_text("机器学习实验", 3), "机器学...");
        assert_eq!(truncate_text("abc", 10), "abc");
    }
}
