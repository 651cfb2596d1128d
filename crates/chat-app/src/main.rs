mod settings;
mod terminal;

use std::io::Write;
use std::process::ExitCode;

use lumen_chat::{ChatSession, SubmitRejected};
use lumen_llm::{Model, create_provider, create_session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;
use crate::terminal::{PromptLine, TerminalViewport, TranscriptPrinter};

const QUIT_COMMAND: &str = "/quit";
const MODELS_COMMAND: &str = "/models";
const PROMPT: &str = "you> ";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings_path = Settings::default_config_path();
    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!(
                path = ?settings_path,
                error = %error,
                "failed to load settings, falling back to defaults"
            );
            Settings::default().with_fallback_api_key(|name| std::env::var(name).ok())
        }
    };
    if !settings.has_api_key() {
        tracing::warn!(
            provider_id = %settings.provider_id,
            "no API key configured, requests will fail"
        );
    }

    let provider = match create_provider(settings.to_provider_config()) {
        Ok(provider) => provider,
        Err(error) => {
            tracing::error!(error = %error, "failed to create provider");
            return ExitCode::FAILURE;
        }
    };
    let connection = create_session(provider, &settings.model, Vec::new());
    let mut session =
        ChatSession::new(connection, TerminalViewport).with_response_mode(settings.response_mode);

    match run(&mut session).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "terminal I/O failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(session: &mut ChatSession<TerminalViewport>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printer = TranscriptPrinter::new(std::io::stdout());

    loop {
        write_prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            QUIT_COMMAND => break,
            MODELS_COMMAND => {
                list_models(session)?;
                continue;
            }
            _ => {}
        }

        let mut input = PromptLine::new(line);
        let submission = match session.submit(&mut input) {
            Ok(submission) => submission,
            Err(SubmitRejected::EmptyInput { .. }) => continue,
            Err(rejection) => {
                tracing::warn!(%rejection, "submission rejected");
                continue;
            }
        };
        printer.render(session.transcript())?;

        let mut rendered = Ok(());
        let progress = session
            .drive_with(submission, |session, _| {
                if rendered.is_ok() {
                    rendered = printer.render(session.transcript());
                }
            })
            .await;
        rendered?;
        printer.finish_turn()?;
        tracing::debug!(?progress, "reply finished");
    }

    Ok(())
}

fn write_prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{PROMPT}")?;
    stdout.flush()
}

fn list_models(session: &ChatSession<TerminalViewport>) -> std::io::Result<()> {
    let connection = session.connection();
    let mut stdout = std::io::stdout();
    write_models(
        &mut stdout,
        connection.provider().models(),
        connection.model_id(),
    )?;
    stdout.flush()
}

/// One line per model, the active one marked with `*`.
fn write_models(out: &mut impl Write, models: &[Model], active: &str) -> std::io::Result<()> {
    for model in models {
        let marker = if model.id == active { "*" } else { " " };
        match &model.description {
            Some(description) => writeln!(out, "{marker} {} - {description}", model.id)?,
            None => writeln!(out, "{marker} {}", model.id)?,
        }
    }
    Ok(())
}
