// ==========================================
// 诊所排班系统 - 日志初始化
// ==========================================
// 输出: 标准错误（标准输出留给运行报告）
// 环境变量:
//   RUST_LOG                 过滤器，默认 info
//   CLINIC_SHIFT_LOG_FORMAT  设为 json 时输出结构化 JSON 行
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

const LOG_FORMAT_ENV: &str = "CLINIC_SHIFT_LOG_FORMAT";

fn json_requested() -> bool {
    std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// 初始化日志系统
///
/// 例如: `RUST_LOG=clinic_shift_scheduler::engine=debug`
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true);

    // 重复初始化时忽略
    let _ = if json_requested() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// 测试用: debug 级别，输出交给测试框架捕获
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("clinic_shift_scheduler=debug"))
        .with_test_writer()
        .try_init();
}
