//! gateway CLI 分发：`run`、`doctor`、`apikey`、`sweep`、`version`。

use std::{path::Path, sync::Arc};

use anyhow::{Context, anyhow};
use serde_json::json;

use crate::{
    auth::{
        api_key::ApiKeyValidator, refresh::RefreshTokenStore, store::FileCredentialStore,
    },
    config::{DEFAULT_APP_ADDR, SECRET_KEY_ENV, store_path_from_env},
};

/// CLI 分发结果。
pub(crate) enum CliDispatch {
    /// 继续进入 gateway 主循环。
    Run,
    /// 命令已处理完成，主程序应退出。
    Exit,
}

/// 已解析的 CLI 命令。
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run,
    Help,
    Version,
    Doctor(DoctorFormat),
    ApiKeyCreate {
        user_id: u64,
        client: String,
        scope: String,
    },
    ApiKeyDeactivate(String),
    ApiKeyList,
    Sweep,
}

/// `doctor` 输出格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DoctorFormat {
    Text,
    Json,
}

/// 解析并执行 gateway CLI。
pub(crate) async fn dispatch(args: &[String]) -> anyhow::Result<CliDispatch> {
    match parse(args)? {
        Command::Run => return Ok(CliDispatch::Run),
        Command::Help => print_root_help(),
        Command::Version => println!("{}", env!("CARGO_PKG_VERSION")),
        Command::Doctor(format) => run_doctor(format),
        Command::ApiKeyCreate {
            user_id,
            client,
            scope,
        } => {
            let record = key_validator()?.create(user_id, &client, &scope).await?;
            println!("{}", record.key);
        }
        Command::ApiKeyDeactivate(key) => {
            if !key_validator()?.deactivate(&key).await? {
                return Err(anyhow!("api key not found"));
            }
            println!("deactivated");
        }
        Command::ApiKeyList => {
            for record in key_validator()?.list().await? {
                println!(
                    "{}\tuser={}\tclient={}\tscope={}\t{}",
                    mask_key(&record.key),
                    record.user_id,
                    record.client,
                    record.scope,
                    if record.active { "active" } else { "inactive" }
                );
            }
        }
        Command::Sweep => {
            let store = Arc::new(open_store(&store_path_from_env())?);
            let removed = RefreshTokenStore::new(store).sweep_expired().await?;
            println!("removed {removed} expired refresh tokens");
        }
    }
    Ok(CliDispatch::Exit)
}

/// 纯解析，不做任何 IO。
fn parse(args: &[String]) -> anyhow::Result<Command> {
    let Some(first) = args.first() else {
        return Ok(Command::Run);
    };
    let cmd = first.trim();
    if cmd.is_empty() || cmd == "run" {
        return Ok(Command::Run);
    }

    match cmd {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "version" | "--version" => Ok(Command::Version),
        "doctor" => Ok(Command::Doctor(parse_doctor_format(&args[1..])?)),
        "apikey" => parse_apikey(&args[1..]),
        "sweep" => Ok(Command::Sweep),
        other => Err(anyhow!(
            "unknown command: {other}; run `ag-gateway --help` for usage"
        )),
    }
}

/// 解析 doctor 的 `--format` 参数。
fn parse_doctor_format(args: &[String]) -> anyhow::Result<DoctorFormat> {
    if args.is_empty() {
        return Ok(DoctorFormat::Text);
    }
    if args.len() == 2 && args[0] == "--format" {
        return match args[1].as_str() {
            "text" => Ok(DoctorFormat::Text),
            "json" => Ok(DoctorFormat::Json),
            other => Err(anyhow!("unsupported doctor format: {other}")),
        };
    }
    Err(anyhow!("usage: ag-gateway doctor [--format text|json]"))
}

/// 解析 `apikey <create|deactivate|list>`。
fn parse_apikey(args: &[String]) -> anyhow::Result<Command> {
    match args.first().map(String::as_str) {
        Some("create") => {
            let mut user_id = None;
            let mut client = None;
            let mut scope = None;
            let mut rest = args[1..].iter();
            while let Some(flag) = rest.next() {
                let value = rest
                    .next()
                    .ok_or_else(|| anyhow!("missing value for {flag}"))?;
                match flag.as_str() {
                    "--user" => {
                        let parsed = value
                            .parse::<u64>()
                            .with_context(|| format!("invalid user id: {value}"))?;
                        user_id = Some(parsed);
                    }
                    "--client" => client = Some(value.clone()),
                    "--scope" => scope = Some(value.clone()),
                    other => return Err(anyhow!("unknown flag: {other}")),
                }
            }
            match (user_id, client, scope) {
                (Some(user_id), Some(client), Some(scope))
                    if !client.trim().is_empty() && !scope.trim().is_empty() =>
                {
                    Ok(Command::ApiKeyCreate {
                        user_id,
                        client,
                        scope,
                    })
                }
                _ => Err(apikey_usage()),
            }
        }
        Some("deactivate") => match args.get(1) {
            Some(key) if args.len() == 2 && !key.trim().is_empty() => {
                Ok(Command::ApiKeyDeactivate(key.trim().to_string()))
            }
            _ => Err(apikey_usage()),
        },
        Some("list") if args.len() == 1 => Ok(Command::ApiKeyList),
        _ => Err(apikey_usage()),
    }
}

fn apikey_usage() -> anyhow::Error {
    anyhow!(
        "usage: ag-gateway apikey create --user <id> --client <label> --scope <scope> | deactivate <key> | list"
    )
}

/// 打开凭证存储文件。
fn open_store(path: &Path) -> anyhow::Result<FileCredentialStore> {
    FileCredentialStore::open(path.to_path_buf())
        .with_context(|| format!("open credential store: {}", path.display()))
}

fn key_validator() -> anyhow::Result<ApiKeyValidator> {
    let store = open_store(&store_path_from_env())?;
    Ok(ApiKeyValidator::new(Arc::new(store)))
}

/// 列表中只展示 key 前缀，避免终端历史泄漏完整凭证。
fn mask_key(key: &str) -> String {
    let visible = key.get(..12).unwrap_or(key);
    format!("{visible}…")
}

/// 打印 doctor 信息；签名密钥缺失时以非零码退出。
fn run_doctor(format: DoctorFormat) {
    let addr = std::env::var("APP_ADDR").unwrap_or_else(|_| DEFAULT_APP_ADDR.to_string());
    let store_path = store_path_from_env();
    let store_exists = store_path.exists();
    let secret_configured = std::env::var(SECRET_KEY_ENV)
        .map(|raw| !raw.trim().is_empty())
        .unwrap_or(false);

    match format {
        DoctorFormat::Text => {
            println!("app-addr: {addr}");
            println!("store-path: {}", store_path.display());
            println!("store-exists: {}", if store_exists { "yes" } else { "no" });
            println!(
                "secret-configured: {}",
                if secret_configured { "yes" } else { "no" }
            );
        }
        DoctorFormat::Json => {
            let payload = json!({
                "appAddr": addr,
                "storePath": store_path.display().to_string(),
                "storeExists": store_exists,
                "secretConfigured": secret_configured,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string())
            );
        }
    }

    if !secret_configured {
        std::process::exit(1);
    }
}

/// 打印 root help。
fn print_root_help() {
    println!("ag-gateway usage:");
    println!("  ag-gateway run");
    println!("  ag-gateway doctor [--format text|json]");
    println!("  ag-gateway apikey create --user <id> --client <label> --scope <scope>");
    println!("  ag-gateway apikey deactivate <key>");
    println!("  ag-gateway apikey list");
    println!("  ag-gateway sweep");
    println!("  ag-gateway version");
}
