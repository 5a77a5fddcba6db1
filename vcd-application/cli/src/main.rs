use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "vcd")]
#[command(about = "VCD 云管理平台命令行工具", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件和 VCD_LOG_LEVEL
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 记录请求体和响应体 (已脱敏)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 组织
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },

    /// 虚拟数据中心
    Vdc {
        #[command(subcommand)]
        action: VdcAction,
    },

    /// vApp 组合
    Vapp {
        #[command(subcommand)]
        action: VappAction,
    },

    /// 异步任务
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// 级联删除
    Delete {
        #[command(subcommand)]
        action: DeleteAction,
    },
}

#[derive(Subcommand)]
pub enum OrgAction {
    /// 按名称查询组织
    Show {
        /// 组织名称
        name: String,
    },
}

#[derive(Subcommand)]
pub enum VdcAction {
    /// 显示虚拟数据中心及其 vApp
    Show {
        /// 虚拟数据中心 href
        href: String,
    },
}

#[derive(Subcommand)]
pub enum VappAction {
    /// 按 JSON 描述组合新 vApp
    Compose {
        /// 目标虚拟数据中心 href
        #[arg(long)]
        vdc: String,

        /// 组合请求文件 (JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// 提交后不等待任务完成
        #[arg(long)]
        no_wait: bool,
    },

    /// 向已有 vApp 追加虚拟机
    Recompose {
        /// vApp href
        href: String,

        /// 组合请求文件 (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// 等待任务结束
    Wait {
        /// 任务 href
        href: String,

        /// 超时时间 (秒)，默认取配置
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum DeleteAction {
    /// 只输出删除计划
    Plan {
        /// 根对象类型
        #[arg(value_enum)]
        kind: RootKind,

        /// 根对象 href
        href: String,

        #[arg(long)]
        force: bool,

        #[arg(long)]
        recursive: bool,
    },

    /// 执行删除
    Run {
        /// 根对象类型
        #[arg(value_enum)]
        kind: RootKind,

        /// 根对象 href
        href: String,

        #[arg(long)]
        force: bool,

        #[arg(long)]
        recursive: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RootKind {
    Org,
    Vdc,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if cli.verbose {
        config.verbosity = vcd_transport::Verbosity::Verbose;
    }

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;
    let session = commands::session::Session::open(&config).await?;

    let result = match cli.command {
        Commands::Org { action } => commands::org::handle(action, &session).await,
        Commands::Vdc { action } => commands::vdc::handle(action, &session).await,
        Commands::Vapp { action } => commands::vapp::handle(action, &session).await,
        Commands::Task { action } => commands::task::handle(action, &session).await,
        Commands::Delete { action } => commands::delete::handle(action, &session).await,
    };

    session.close().await;
    result
}
