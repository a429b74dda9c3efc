use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where profiles, questions and payments are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistenceBackend {
    DynamoDb,
    Memory,
}

impl FromStr for PersistenceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynamodb" | "aws" => Ok(Self::DynamoDb),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown persistence backend '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TableNames {
    pub users: String,
    pub questions: String,
    pub payments: String,
}

#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub persistence: PersistenceBackend,
    // Store region as string for simplicity here, startup converts
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    // Without a bucket the storage share tier is skipped
    pub meme_bucket_name: Option<String>,
    pub tables: TableNames,
    pub completion: CompletionConfig,
    pub meme_font_path: Option<PathBuf>,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        check_dotenv(dotenvy::dotenv().map(|_| ()))?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let persistence = match lookup("PERSISTENCE_BACKEND") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidVar("PERSISTENCE_BACKEND".into(), e))?,
            None => PersistenceBackend::DynamoDb,
        };

        let aws_region = lookup("AWS_DEFAULT_REGION").unwrap_or_else(|| "ca-central-1".to_string());
        let localstack_endpoint = lookup("AWS_ENDPOINT_URL");
        let meme_bucket_name = lookup("MEME_BUCKET_NAME").filter(|s| !s.trim().is_empty());

        let tables = TableNames {
            users: lookup("USERS_TABLE").unwrap_or_else(|| "users".to_string()),
            questions: lookup("QUESTIONS_TABLE").unwrap_or_else(|| "questions".to_string()),
            payments: lookup("PAYMENTS_TABLE").unwrap_or_else(|| "payments".to_string()),
        };

        let completion = CompletionConfig {
            api_url: lookup("COMPLETION_API_URL")
                .unwrap_or_else(|| "https://api.perplexity.ai/chat/completions".to_string()),
            api_key: lookup("COMPLETION_API_KEY")
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar("COMPLETION_API_KEY".into()))?,
            model: lookup("COMPLETION_MODEL").unwrap_or_else(|| "sonar-pro".to_string()),
        };

        let meme_font_path = lookup("MEME_FONT_PATH").map(PathBuf::from);
        let canvas_width = parse_dimension(&lookup, "MEME_CANVAS_WIDTH")?;
        let canvas_height = parse_dimension(&lookup, "MEME_CANVAS_HEIGHT")?;

        Ok(Config {
            bind_address,
            persistence,
            aws_region,
            localstack_endpoint,
            meme_bucket_name,
            tables,
            completion,
            meme_font_path,
            canvas_width,
            canvas_height,
        })
    }
}

// A missing .env is fine; a malformed one is not.
fn check_dotenv(result: Result<(), dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Err(e) if !e.not_found() => Err(ConfigError::DotEnvError(e)),
        _ => Ok(()),
    }
}

fn parse_dimension<F>(lookup: &F, key: &str) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(500),
        Some(raw) => match raw.trim().parse::<u32>() {
            // Captions need at least the 40px side inset plus some room
            Ok(v) if v >= 100 => Ok(v),
            Ok(v) => Err(ConfigError::InvalidVar(key.into(), format!("{} is below the 100px minimum", v))),
            Err(e) => Err(ConfigError::InvalidVar(key.into(), e.to_string())),
        },
    }
}
