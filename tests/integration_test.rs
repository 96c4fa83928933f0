use educoder_auto_copy::app::App;
use educoder_auto_copy::browser;
use educoder_auto_copy::config::Config;
use educoder_auto_copy::logger;
use educoder_auto_copy::session::{ChromeSession, NavigableSession};

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_full_copy_run() {
    // 初始化日志
    logger::init();

    // 加载配置（账号密码从环境变量读取）
    let config = Config::from_env();

    // 完整流程：登录 → 导航 → 遍历复制
    let summary = App::initialize(config)
        .await
        .expect("初始化应用失败")
        .run()
        .await
        .expect("运行失败");

    println!(
        "通过 {} 关，失败 {} 关，跳过 {} 关",
        summary.total_passed(),
        summary.total_failed(),
        summary.total_skipped()
    );
}

#[tokio::test]
#[ignore]
async fn test_browser_launch() {
    // 初始化日志
    logger::init();

    // 加载配置
    let config = Config::from_env();

    // 测试浏览器启动与双页面创建
    let result = browser::acquire(&config).await;

    assert!(result.is_ok(), "应该能够成功启动浏览器");
}

#[tokio::test]
#[ignore]
async fn test_page_evaluate() {
    // 初始化日志
    logger::init();

    // 加载配置
    let config = Config::from_env();

    let (browser, source_page, _target_page) = browser::acquire(&config)
        .await
        .expect("启动浏览器失败");

    let session = ChromeSession::new(browser, source_page, &config.timeouts).await;
    let value = session
        .evaluate("(window, document) => document.title")
        .await
        .expect("执行脚本失败");

    println!("页面标题: {:?}", value);
}
