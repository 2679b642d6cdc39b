//! Auth gateway 二进制入口：加载配置后启动应用。

mod api;
mod app;
mod auth;
mod cli;
mod config;
mod logging;
mod state;
mod users;

#[tokio::main]
/// 启动 auth gateway。
async fn main() -> anyhow::Result<()> {
    // `.env` 可选，缺失时直接使用进程环境。
    let _ = dotenvy::dotenv();

    let args = std::env::args().skip(1).collect::<Vec<String>>();
    match cli::dispatch(&args).await? {
        cli::CliDispatch::Run => {}
        cli::CliDispatch::Exit => return Ok(()),
    }

    let _log_runtime = logging::init("gateway")?;
    let config = config::Config::from_env()?;
    app::run(config).await
}
