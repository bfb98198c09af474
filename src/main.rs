// ==========================================
// 诊所排班系统 - 命令行入口
// ==========================================
// 用法: clinic-shift-scheduler <clinic_id> <year> <month> [--force] [--dry-run] [--auto-fix]
// 输出: 运行报告（JSON）写到标准输出，日志写到标准错误
// ==========================================

use std::process::ExitCode;

use clinic_shift_scheduler::app::{get_default_db_path, AppState};
use clinic_shift_scheduler::{logging, CancelFlag, RunMode, RunOptions, ValidationMode};

const USAGE: &str = "用法: clinic-shift-scheduler <clinic_id> <year> <month> [--force] [--dry-run] [--auto-fix]";

struct CliArgs {
    clinic_id: String,
    year: i32,
    month: u32,
    options: RunOptions,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut positional = Vec::new();
    let mut options = RunOptions::default();
    for arg in args {
        match arg.as_str() {
            "--force" => options.force_redeploy = true,
            "--dry-run" => options.mode = RunMode::DryRun,
            "--auto-fix" => options.validation_mode = ValidationMode::AutoFix,
            flag if flag.starts_with("--") => return Err(format!("未知参数: {}", flag)),
            value => positional.push(value.to_string()),
        }
    }

    let [clinic_id, year, month] = positional.as_slice() else {
        return Err(USAGE.to_string());
    };
    Ok(CliArgs {
        clinic_id: clinic_id.clone(),
        year: year.parse().map_err(|_| format!("无效的年份: {}", year))?,
        month: month.parse().map_err(|_| format!("无效的月份: {}", month))?,
        options,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::from(2);
        }
    };

    tracing::info!("{} v{}", clinic_shift_scheduler::APP_NAME, clinic_shift_scheduler::VERSION);
    let db_path = get_default_db_path();
    let state = match AppState::new(db_path) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("初始化失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C: 当前周完成后停止
    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号，将在当前营业周结束后停止");
            on_signal.cancel();
        }
    });

    match state
        .schedule_api
        .run_auto_assign(&cli.clinic_id, cli.year, cli.month, cli.options, &cancel)
        .await
    {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("报告序列化失败: {}", e),
            }
            if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("排班失败: {}", e);
            ExitCode::FAILURE
        }
    }
}
