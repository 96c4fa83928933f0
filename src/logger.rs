//! 日志初始化
//!
//! 使用 `tracing` + `EnvFilter`，默认 info 级别，可通过 RUST_LOG 覆盖。

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // try_init: 测试中可能多次调用，重复初始化直接忽略
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
