//! Gatehouse CLI - drive the dashboard session core from a terminal.
//!
//! Logs in, inspects and renews the stored session, makes authenticated
//! calls, and mounts a session guard to watch it work.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use gatehouse_core::api::Method;
use gatehouse_core::{
    AuthClient, AuthStore, Config, CredentialStore, FileStore, GuardConfig, LoginOutcome,
    MemoryStore, Navigator, ReqwestTransport, RequestOptions, Route, SessionGuard,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: gatehouse <command>

Commands:
  login <email>            Log in (prompts for password and OTP if required)
  status                   Verify the stored session and print it
  refresh                  Exchange the refresh credential for a new access token
  get <path>               Authenticated GET, printing status and body
  call <method> <path> [-H name:value]... [json-body]
                           Authenticated request with any method
  watch [permission...]    Mount a session guard and log its transitions
  logout                   Clear the stored session";

/// Environment variable overriding the configured backend origin
const BASE_URL_ENV: &str = "GATEHOUSE_BASE_URL";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

/// Navigation has nowhere to go in a terminal, so it is reported.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        info!(path = route.path(), "Navigation forced");
        eprintln!("-> navigate to {}", route.path());
    }
}

type Auth = AuthStore<ReqwestTransport>;

struct App {
    config: Config,
    transport: Arc<ReqwestTransport>,
    auth: Arc<Auth>,
}

fn build(config: Config) -> Result<App> {
    let transport = Arc::new(
        ReqwestTransport::new(config.request_timeout()).context("Failed to build HTTP client")?,
    );
    let profile = FileStore::open(config.profile_store_path()?);
    let store = CredentialStore::new(Arc::new(MemoryStore::new()), Arc::new(profile));
    let auth = Arc::new(AuthStore::new(transport.clone(), store, &config));

    Ok(App {
        config,
        transport,
        auth,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
        config.base_url = base_url;
    }
    let app = build(config)?;

    match command.as_str() {
        "login" => {
            let email = args.get(1).context("login requires an email")?;
            login(&app, email).await
        }
        "status" => status(&app).await,
        "refresh" => refresh(&app).await,
        "get" => {
            let path = args.get(1).context("get requires a path")?;
            get(&app, path).await
        }
        "call" => call(&app, &args[1..]).await,
        "watch" => watch(&app, args[1..].to_vec()).await,
        "logout" => {
            app.auth.hydrate();
            app.auth.logout().await;
            println!("Logged out");
            Ok(())
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

async fn login(app: &App, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    match app.auth.login(email, &password).await? {
        LoginOutcome::Authenticated => {}
        LoginOutcome::OtpRequired { email } => {
            eprintln!("A one-time code was sent to {}", email);
            let code = rpassword::prompt_password("Code: ")?;
            app.auth.verify_otp(code.trim()).await?;
        }
    }
    let snapshot = app.auth.snapshot();
    println!(
        "Logged in as {} ({})",
        snapshot.identity_key().unwrap_or("unknown"),
        snapshot.role.map(|r| r.as_str()).unwrap_or("no role")
    );
    Ok(())
}

async fn status(app: &App) -> Result<()> {
    let authenticated = app.auth.init().await;
    println!("{}", serde_json::to_string_pretty(&app.auth.snapshot())?);
    if !authenticated {
        bail!("No valid session");
    }
    Ok(())
}

async fn refresh(app: &App) -> Result<()> {
    app.auth.hydrate();
    if !app.auth.refresher().has_refresh_credential() {
        bail!("No refresh credential stored");
    }
    app.auth
        .refresher()
        .refresh(app.auth.role())
        .await
        .context("Refresh failed")?;
    println!("Access token refreshed");
    Ok(())
}

async fn get(app: &App, path: &str) -> Result<()> {
    send(app, path, RequestOptions::get()).await
}

/// Parse `<method> <path> [-H name:value]... [json-body]`
fn parse_call(args: &[String]) -> Result<(String, RequestOptions)> {
    let method = args.first().context("call requires a method")?;
    let method = Method::parse(method).with_context(|| format!("Unsupported method: {}", method))?;
    let path = args.get(1).context("call requires a path")?.clone();

    let mut options = RequestOptions {
        method,
        ..RequestOptions::default()
    };
    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        if arg == "-H" {
            let header = rest.next().context("-H requires name:value")?;
            let (name, value) = header
                .split_once(':')
                .with_context(|| format!("Malformed header: {}", header))?;
            options = options.header(name.trim(), value.trim());
        } else {
            let body = serde_json::from_str(arg).context("Request body is not valid JSON")?;
            options = options.json(body);
        }
    }
    Ok((path, options))
}

async fn call(app: &App, args: &[String]) -> Result<()> {
    let (path, options) = parse_call(args)?;
    send(app, &path, options).await
}

async fn send(app: &App, path: &str, options: RequestOptions) -> Result<()> {
    app.auth.hydrate();
    let client = AuthClient::new(app.transport.clone(), app.auth.clone(), Arc::new(TerminalNavigator));
    let response = client.request(path, options).await?;
    println!("HTTP {}", response.status);
    println!("{}", response.body);
    Ok(())
}

async fn watch(app: &App, permissions: Vec<String>) -> Result<()> {
    // The guard's first check is the only verification
    app.auth.hydrate();
    let navigator = Arc::new(TerminalNavigator);
    let mut guard = SessionGuard::mount(
        app.auth.clone(),
        navigator.clone(),
        permissions,
        GuardConfig::from(&app.config),
    );
    let mut states = guard.subscribe();
    let renewal = app
        .auth
        .clone()
        .spawn_renewal(app.config.refresh_interval(), navigator);

    eprintln!("Watching session (Ctrl-C to stop)");
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("{:?} -> render {:?}", state, state.render());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    guard.unmount();
    renewal.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_call_with_headers_and_body() {
        let (path, options) =
            parse_call(&args(&["patch", "/api/users/7", "-H", "X-Trace: abc", r#"{"name":"Ada"}"#]))
                .unwrap();

        assert_eq!(path, "/api/users/7");
        assert_eq!(options.method, Method::Patch);
        assert_eq!(options.headers, vec![("X-Trace".to_string(), "abc".to_string())]);
        assert_eq!(options.body.unwrap()["name"], "Ada");
    }

    #[test]
    fn test_parse_call_rejects_bad_input() {
        assert!(parse_call(&args(&["TRACE", "/"])).is_err());
        assert!(parse_call(&args(&["GET"])).is_err());
        assert!(parse_call(&args(&["GET", "/", "-H", "no-colon"])).is_err());
        assert!(parse_call(&args(&["POST", "/", "{not json"])).is_err());
    }
}
