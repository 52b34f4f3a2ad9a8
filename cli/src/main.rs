use std::sync::Arc;

use authsession::{
    AccessToken, ApiRequest, HttpTransport, LoginRequest, SessionConfig, SessionError, SessionFacade,
};
use clap::{Parser, Subcommand};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("server returned HTTP {status} for {path}: {message}")]
    ServerError { path: String, status: u16, message: String },
    #[error("{failed} of {total} requests failed")]
    Partial { failed: usize, total: usize },
}

#[derive(Parser, Debug)]
#[command(name = "authsession", about = "Session-aware API client with single-flight token refresh")]
struct Cli {
    /// Overrides `AUTH_BASE_URL` from the environment.
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token to start the session with.
    #[arg(long, env = "AUTH_ACCESS_TOKEN")]
    access_token: Option<String>,

    /// Raw `Cookie` header sent with every request, e.g. `refresh_token=...`.
    #[arg(long, env = "AUTH_SESSION_COOKIE")]
    session_cookie: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        mfa_code: Option<String>,
    },
    Register {
        /// Account payload as a JSON object.
        #[arg(long)]
        data: String,
    },
    Me,
    Logout,
    /// Run session initialization as if the app were opened at `path`.
    Probe { path: String },
    /// GET a protected path through one session, optionally many times at once.
    Get {
        path: String,
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let facade = build_facade(&cli)?;

    match cli.command {
        Command::Login { username, password, mfa_code } => {
            let mut request = LoginRequest::new(username, password);
            if let Some(code) = mfa_code {
                request = request.with_mfa_code(code);
            }
            let response = facade.login(&request).await?;
            print_json(&json!({
                "user": response.user,
                "access_token": response.access_token.as_ref().map(AccessToken::as_str),
            }))
        }
        Command::Register { data } => {
            let payload: Value = serde_json::from_str(&data)?;
            print_json(&facade.register(&payload).await?)
        }
        Command::Me => print_json(facade.get_current_user().await?.as_value()),
        Command::Logout => {
            facade.logout().await?;
            println!("logged out");
            Ok(())
        }
        Command::Probe { path } => {
            facade.initialize(&path).await;
            let snapshot = facade.snapshot();
            print_json(&json!({
                "initialized": snapshot.initialized,
                "authenticated": snapshot.authenticated,
                "user": snapshot.user,
            }))
        }
        Command::Get { path, concurrency } => run_get(Arc::new(facade), path, concurrency.max(1)).await,
    }
}

fn build_facade(cli: &Cli) -> Result<SessionFacade, CliError> {
    let mut config = SessionConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }

    let mut headers = HeaderMap::new();
    if let Some(cookie) = &cli.session_cookie {
        let mut value = HeaderValue::from_str(cookie)?;
        value.set_sensitive(true);
        headers.insert(COOKIE, value);
    }
    let transport = HttpTransport::with_default_headers(&config, headers)?;
    tracing::debug!(base_url = %config.base_url, cookie = cli.session_cookie.is_some(), "session configured");

    let facade = SessionFacade::new(config, Arc::new(transport));
    if let Some(token) = &cli.access_token {
        facade.set_access_token(AccessToken::new(token.as_str()));
    }
    Ok(facade)
}

async fn run_get(facade: Arc<SessionFacade>, path: String, concurrency: usize) -> Result<(), CliError> {
    let handles: Vec<_> = (0..concurrency)
        .map(|_| {
            let facade = facade.clone();
            let path = path.clone();
            tokio::spawn(async move { facade.send(ApiRequest::get(path)).await })
        })
        .collect();

    let mut failed = 0;
    for result in futures_util::future::join_all(handles).await {
        match result? {
            Ok(response) if response.is_success() => {
                match response.json::<Value>() {
                    Ok(body) => print_json(&body)?,
                    Err(_) => println!("{}", response.body),
                }
            }
            Ok(response) => {
                failed += 1;
                let err = CliError::ServerError {
                    path: path.clone(),
                    status: response.status,
                    message: response.server_message().unwrap_or(response.body),
                };
                eprintln!("{err}");
            }
            Err(err) => {
                failed += 1;
                eprintln!("{err}");
            }
        }
    }

    let refreshes = facade.pipeline().coordinator().generation();
    eprintln!("completed {concurrency} request(s); {refreshes} token refresh(es)");

    if failed > 0 {
        return Err(CliError::Partial { failed, total: concurrency });
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
