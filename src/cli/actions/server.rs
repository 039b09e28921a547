use crate::{
    cli::{globals::GlobalArgs, telemetry},
    gate::{
        self, attempts::AttemptPolicy, bootstrap::RetryPolicy, handlers::ClientAddressing,
        GateConfig,
    },
};
use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use tracing::info;
use url::Url;

pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub admin_secret: SecretString,
    pub relay_url: Url,
    pub relay_timeout_seconds: u64,
    pub max_attempts: u32,
    pub lockout_seconds: u64,
    pub max_tracked_clients: usize,
    pub trust_forwarded: bool,
    pub db_connect_attempts: u32,
    pub db_connect_delay_seconds: u64,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("dsn", &redact_dsn(&self.dsn))
            .field("admin_secret", &"***")
            .field("relay_host", &self.relay_url.host_str().unwrap_or("none"))
            .field("relay_timeout_seconds", &self.relay_timeout_seconds)
            .field("max_attempts", &self.max_attempts)
            .field("lockout_seconds", &self.lockout_seconds)
            .field("max_tracked_clients", &self.max_tracked_clients)
            .field("trust_forwarded", &self.trust_forwarded)
            .field("db_connect_attempts", &self.db_connect_attempts)
            .field("db_connect_delay_seconds", &self.db_connect_delay_seconds)
            .finish()
    }
}

impl Args {
    fn gate_config(&self) -> GateConfig {
        let policy = AttemptPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_lockout_seconds(self.lockout_seconds)
            .with_max_tracked_clients(self.max_tracked_clients);

        let db_retry = RetryPolicy::new()
            .with_attempts(self.db_connect_attempts)
            .with_delay(Duration::from_secs(self.db_connect_delay_seconds));

        let addressing = if self.trust_forwarded {
            ClientAddressing::forwarded()
        } else {
            ClientAddressing::peer()
        };

        GateConfig::new()
            .with_policy(policy)
            .with_relay_timeout_seconds(self.relay_timeout_seconds)
            .with_db_retry(db_retry)
            .with_addressing(addressing)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database never becomes ready or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let config = args.gate_config();
    let globals = GlobalArgs::new(args.admin_secret, args.relay_url);

    let result = gate::new(args.port, args.dsn, &globals, config).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        (
            "relay_host",
            args.relay_url.host_str().unwrap_or("none").to_string(),
        ),
        ("relay_timeout", format!("{}s", args.relay_timeout_seconds)),
        ("max_attempts", args.max_attempts.to_string()),
        ("lockout", format!("{}s", args.lockout_seconds)),
        ("max_tracked_clients", args.max_tracked_clients.to_string()),
        ("trust_forwarded", args.trust_forwarded.to_string()),
        (
            "db_connect",
            format!(
                "{} attempts, {}s apart",
                args.db_connect_attempts, args.db_connect_delay_seconds
            ),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "passgate {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
