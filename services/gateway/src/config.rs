//! 配置模块职责：
//! 1. 从环境变量（可选 `.env`）读取 gateway 运行配置并提供默认值。
//! 2. 签名密钥缺失或为空时直接判定启动失败，不回退到弱密钥。
//! 3. 解析凭证存储路径与后台清理周期。

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use tracing::warn;

use crate::auth::token::SigningSecret;

/// 默认监听地址。
pub(crate) const DEFAULT_APP_ADDR: &str = "0.0.0.0:18080";
/// 签名密钥环境变量。
pub(crate) const SECRET_KEY_ENV: &str = "SECRET_KEY";
/// 监听地址环境变量。
const APP_ADDR_ENV: &str = "APP_ADDR";
/// 凭证存储路径环境变量。
const STORE_PATH_ENV: &str = "AG_STORE_PATH";
/// refresh 清理周期环境变量（秒）。
const SWEEP_INTERVAL_ENV: &str = "AG_SWEEP_INTERVAL_SEC";
/// refresh 清理默认周期（秒）。
const DEFAULT_SWEEP_INTERVAL_SEC: u64 = 3600;
/// HS256 建议的最短密钥长度（字节）。
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Gateway 运行时配置。
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// HTTP 监听地址。
    pub(crate) addr: String,
    /// access token 签名密钥。
    pub(crate) secret: SigningSecret,
    /// 凭证存储文件路径。
    pub(crate) store_path: PathBuf,
    /// 过期 refresh token 清理周期。
    pub(crate) sweep_interval: Duration,
}

impl Config {
    /// 从进程环境读取配置。
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 从任意变量来源读取配置（便于测试注入）。
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let Some(raw_secret) = lookup(SECRET_KEY_ENV) else {
            bail!("{SECRET_KEY_ENV} is not set; refusing to start without a signing secret");
        };
        let secret = SigningSecret::new(&raw_secret)
            .with_context(|| format!("{SECRET_KEY_ENV} is empty"))?;
        if secret.len() < RECOMMENDED_SECRET_LEN {
            warn!(
                "{SECRET_KEY_ENV} is shorter than {RECOMMENDED_SECRET_LEN} bytes; use a longer random value"
            );
        }

        let addr = lookup(APP_ADDR_ENV)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| DEFAULT_APP_ADDR.to_string());

        Ok(Self {
            addr,
            secret,
            store_path: resolve_store_path(&lookup),
            sweep_interval: parse_sweep_interval(lookup(SWEEP_INTERVAL_ENV)),
        })
    }
}

/// 从进程环境解析凭证存储路径（CLI 运维命令不需要签名密钥）。
pub(crate) fn store_path_from_env() -> PathBuf {
    resolve_store_path(&|name: &str| std::env::var(name).ok())
}

/// 解析凭证存储路径：优先 `AG_STORE_PATH`，回退 `$HOME/.config/authgate/gateway`。
fn resolve_store_path(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup(STORE_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    let home = lookup("HOME").unwrap_or_else(|| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("authgate")
        .join("gateway")
        .join("credential-store.json")
}

/// 解析清理周期；非法或为 0 时回退默认值。
fn parse_sweep_interval(raw: Option<String>) -> Duration {
    let sec = raw
        .as_deref()
        .map(str::trim)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SEC);
    Duration::from_secs(sec)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, path::PathBuf, time::Duration};

    use super::{Config, DEFAULT_APP_ADDR};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_or_blank_secret_is_fatal() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("SECRET_KEY", "")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SECRET_KEY", "  \t")])).is_err());
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup(&[
            ("SECRET_KEY", "0123456789abcdef0123456789abcdef"),
            ("HOME", "/home/ops"),
        ]))
        .expect("config");
        assert_eq!(config.addr, DEFAULT_APP_ADDR);
        assert_eq!(
            config.store_path,
            PathBuf::from("/home/ops/.config/authgate/gateway/credential-store.json")
        );
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
    }

    #[test]
    fn overrides_are_honored_and_bad_interval_falls_back() {
        let config = Config::from_lookup(lookup(&[
            ("SECRET_KEY", "s"),
            ("APP_ADDR", "127.0.0.1:9000"),
            ("AG_STORE_PATH", "/var/lib/authgate/store.json"),
            ("AG_SWEEP_INTERVAL_SEC", "60"),
        ]))
        .expect("config");
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.store_path, PathBuf::from("/var/lib/authgate/store.json"));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));

        for bad in ["0", "-5", "soon"] {
            let config = Config::from_lookup(lookup(&[
                ("SECRET_KEY", "s"),
                ("AG_SWEEP_INTERVAL_SEC", bad),
            ]))
            .expect("config");
            assert_eq!(config.sweep_interval, Duration::from_secs(3600), "{bad}");
        }
    }

    #[test]
    fn debug_output_never_contains_the_secret() {
        let config =
            Config::from_lookup(lookup(&[("SECRET_KEY", "do-not-print-me")])).expect("config");
        assert!(!format!("{config:?}").contains("do-not-print-me"));
    }
}
