use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use admin_gateway::security::signature;
use admin_gateway::security::token::{parse_hmac_algorithm, TokenService};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the admin gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the hex HMAC-SHA256 signature of a request body
    Sign {
        #[arg(short, long)]
        secret: String,
        /// Body given inline
        #[arg(short, long, conflicts_with = "file")]
        body: Option<String>,
        /// Body read from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Issue a bearer token for a user
    Token {
        #[arg(short, long)]
        secret: String,
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value_t = 86_400)]
        ttl: u64,
        #[arg(long, default_value = "HS256")]
        algorithm: String,
    },
    /// Fetch gateway status
    Status {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
        /// Bearer token sent as Authorization
        #[arg(short, long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sign { secret, body, file } => {
            let body = match (body, file) {
                (Some(body), _) => body.into_bytes(),
                (None, Some(path)) => std::fs::read(path)?,
                (None, None) => Vec::new(),
            };
            println!("{}", signature::sign(&body, secret.as_bytes()));
        }
        Commands::Token {
            secret,
            user,
            ttl,
            algorithm,
        } => {
            let algorithm = parse_hmac_algorithm(&algorithm)
                .ok_or_else(|| format!("unsupported algorithm {}", algorithm))?;
            let tokens = TokenService::new(secret.as_bytes(), algorithm, ttl);
            println!("{}", tokens.issue(&user)?);
        }
        Commands::Status { url, token } => {
            let mut headers = HeaderMap::new();
            if let Some(token) = token {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", token))?,
                );
            }
            let res = reqwest::Client::new()
                .get(format!("{}/admin/status", url.trim_end_matches('/')))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
