use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::cli::console;
use crate::client::FeedbackClient;
use crate::core::config::Config;
use crate::core::protocol::{first_line, FeedbackRequest, FeedbackResult};
use crate::core::session::FeedbackSession;
use crate::core::settings::ProjectStore;
use crate::server::{start_server, AppState, HostLauncher};

/// How long the host waits for the console to drain after the session ends.
const CONSOLE_DRAIN: Duration = Duration::from_millis(200);

pub async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.port);

    let launcher = HostLauncher::from_current_exe()?;
    let state = AppState {
        launcher: Arc::new(launcher),
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
    };

    println!("🚀 AskUser server starting on http://localhost:{}", port);
    println!("💬 Feedback dialogs will open in this terminal");
    println!("💡 Use Ctrl+C to stop the server");
    start_server(port, state).await
}

pub async fn ask(
    config: Config,
    summary: String,
    dir: String,
    save: Option<String>,
    endpoint: Option<String>,
    json: bool,
) -> Result<()> {
    let client = match endpoint {
        Some(endpoint) => FeedbackClient::new(endpoint),
        None => FeedbackClient::from_config(&config),
    };

    if !client.is_server_running().await {
        anyhow::bail!(
            "No AskUser server at {}. Start one with 'askuser serve'.",
            client.base_url()
        );
    }

    let request = FeedbackRequest {
        project_directory: first_line(&resolve_directory(&dir)?).to_string(),
        prompt: first_line(&summary).to_string(),
        server_save_path: save,
    };

    tracing::info!("Waiting for feedback on {}", request.project_directory);
    let result = client.run_feedback(&request).await?;

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// Runs one feedback session in this terminal and writes the result as a
/// single JSON line on stdout. The server invokes this subcommand for every
/// request; it also works standalone.
pub async fn session(
    _config: Config,
    dir: PathBuf,
    prompt: String,
    settings_file: Option<PathBuf>,
) -> Result<()> {
    let result = match run_session(dir, prompt, settings_file).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Feedback session failed: {:#}", e);
            FeedbackResult {
                logs: format!("Error running feedback session: {:#}\n", e),
                interactive_feedback: String::new(),
            }
        }
    };

    {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer(&mut stdout, &result)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    // A pending stdin read would keep the runtime from shutting down.
    std::process::exit(0);
}

async fn run_session(
    dir: PathBuf,
    prompt: String,
    settings_file: Option<PathBuf>,
) -> Result<FeedbackResult> {
    let store = match settings_file {
        Some(path) => ProjectStore::open(path)?,
        None => ProjectStore::load_default()?,
    };

    let (session, channels) = FeedbackSession::new(prompt, dir, store);
    let display_rx = channels.display.subscribe();
    let console = tokio::spawn(console::run_console(channels, display_rx));

    let result = session.run().await;

    // Let the console print the closing events before the process goes away.
    let _ = tokio::time::timeout(CONSOLE_DRAIN, console).await;

    Ok(result)
}

fn resolve_directory(dir: &str) -> Result<String> {
    let path = if dir == "." {
        std::env::current_dir()?
    } else {
        let path = PathBuf::from(dir);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        }
    };
    Ok(path.to_string_lossy().to_string())
}

fn print_result(result: &FeedbackResult) {
    if !result.logs.is_empty() {
        println!("--- Command logs ---");
        print!("{}", result.logs);
        println!("--------------------");
    }
    if result.interactive_feedback.is_empty() {
        println!("(no feedback given)");
    } else {
        println!("{}", result.interactive_feedback);
    }
}
