//! Server configuration from flags, environment and `.env`

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "society-api")]
#[command(about = "Residential society management API server")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:society.db?mode=rwc")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "5")]
    pub database_max_connections: u32,

    /// HS256 signing secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Bearer token lifetime in hours
    #[arg(long, env = "TOKEN_TTL_HOURS", default_value = "168")]
    pub token_ttl_hours: u64,

    /// Directory uploaded images are written to
    #[arg(long, env = "MEDIA_DIR", default_value = "./media")]
    pub media_dir: PathBuf,

    /// Public URL prefix the media directory is served under
    #[arg(long, env = "MEDIA_BASE_URL", default_value = "/media")]
    pub media_base_url: String,

    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    pub twilio_account_sid: Option<String>,

    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    pub twilio_auth_token: Option<String>,

    /// Sender number for outgoing SMS
    #[arg(long, env = "TWILIO_FROM")]
    pub twilio_from: Option<String>,

    #[arg(long, env = "FCM_SERVER_KEY", hide_env_values = true)]
    pub fcm_server_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_hours * 60 * 60
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Twilio credentials when all three are configured
    pub fn twilio(&self) -> Option<(String, String, String)> {
        match (
            &self.twilio_account_sid,
            &self.twilio_auth_token,
            &self.twilio_from,
        ) {
            (Some(sid), Some(token), Some(from)) => {
                Some((sid.clone(), token.clone(), from.clone()))
            }
            _ => None,
        }
    }
}
