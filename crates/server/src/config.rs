use serde::{Deserialize, Serialize};
use services::services::linkedin::QueryIds;
use ts_rs::TS;

pub const DEFAULT_PORT: u16 = 8420;

/// Which build of the gateway this is. The extension reads it from
/// `/api/v1/server/info` to decide whether `server_call=true` is even worth
/// offering; SaaS never executes LinkedIn calls from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Core,
    Saas,
    Enterprise,
}

impl Edition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edition::Core => "core",
            Edition::Saas => "saas",
            Edition::Enterprise => "enterprise",
        }
    }

    pub fn server_execution_allowed(&self) -> bool {
        !matches!(self, Edition::Saas)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "core" => Some(Edition::Core),
            "saas" => Some(Edition::Saas),
            "enterprise" => Some(Edition::Enterprise),
            _ => None,
        }
    }
}

/// Process configuration, read from the environment exactly once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub public_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub secret_key: String,
    pub jwt_secret: String,
    pub linkedin_client_id: Option<String>,
    pub linkedin_client_secret: Option<String>,
    pub edition: Edition,
    pub channel: String,
    pub server_name: String,
    pub is_default_server: bool,
    pub query_ids: QueryIds,
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let port = non_empty("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let cors_origins = non_empty("CORS_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let secret_key = non_empty("SECRET_KEY").unwrap_or_else(|| {
            tracing::warn!("SECRET_KEY not set; using a development default");
            "dev-secret-key".to_string()
        });
        let jwt_secret = non_empty("JWT_SECRET_KEY").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET_KEY not set; session tokens use the development secret");
            secret_key.clone()
        });

        let edition = non_empty("GATEWAY_EDITION")
            .and_then(|v| Edition::parse(&v))
            .unwrap_or(Edition::Core);

        Self {
            port,
            public_url: non_empty("PUBLIC_URL"),
            cors_origins,
            secret_key,
            jwt_secret,
            linkedin_client_id: non_empty("LINKEDIN_CLIENT_ID"),
            linkedin_client_secret: non_empty("LINKEDIN_CLIENT_SECRET"),
            edition,
            channel: non_empty("GATEWAY_CHANNEL").unwrap_or_else(|| "stable".to_string()),
            server_name: non_empty("GATEWAY_SERVER_NAME").unwrap_or_else(|| "linkgate".to_string()),
            is_default_server: non_empty("GATEWAY_DEFAULT_SERVER")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            query_ids: QueryIds::from_env(),
        }
    }

    /// Whether the out-of-scope OAuth module has what it needs; surfaced at
    /// `/auth/linkedin/config-status` for the extension's setup screen.
    pub fn linkedin_oauth_configured(&self) -> bool {
        self.linkedin_client_id.is_some() && self.linkedin_client_secret.is_some()
    }

    pub fn allow_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}
