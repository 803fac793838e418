// ABOUTME: App orchestrator — wires config, backend, store, log and session manager, then runs the console loop.
// ABOUTME: Every exit path (/exit, EOF, Ctrl-C) goes through the same cleanup-and-save.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::backend::{self, Backend};
use crate::commands::{Command, HELP};
use crate::config::Config;
use crate::identity::Identity;
use crate::session::history::Message;
use crate::session::log::WriteAheadLog;
use crate::session::persistence::SessionStore;
use crate::session::{Advised, Session, SessionDeps, SessionManager};

/// Exit code used when the process is interrupted.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Characters of each message shown in a history summary.
const SUMMARY_PREVIEW_CHARS: usize = 100;

/// What the console loop does after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Top-level application.
pub struct App {
    config: Config,
    session_id: Option<String>,
}

impl App {
    /// Create a new app; `session_id` requests a restore at startup.
    pub fn new(config: Config, session_id: Option<String>) -> Self {
        Self { config, session_id }
    }

    /// Build the session manager. Configuration errors surface here, before any session exists.
    pub fn build_manager(&self) -> anyhow::Result<SessionManager> {
        let kind = self.config.backend_kind()?;
        let backend: Arc<dyn Backend> = backend::create_backend(kind, &self.config.backend)?;
        let deps = SessionDeps {
            backend,
            store: SessionStore::new(self.config.sessions_dir()),
            wal: WriteAheadLog::new(self.config.wal_path()),
            budget_hint: self.config.backend.budget_hint,
        };
        let identity = Identity::from_config(&self.config.identity);
        Ok(SessionManager::new(deps, identity))
    }

    /// Run the console loop until /exit, EOF, or an interrupt.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut manager = self.build_manager()?;
        println!("{}", manager.deps().backend.describe_readiness());

        if let Some(err) = manager.initialize(self.session_id.as_deref())? {
            println!("Could not restore requested session: {err}");
            println!("Started a new session instead.");
        }
        print_session_banner(&mut manager)?;

        let mut stdin = BufReader::new(tokio::io::stdin());
        let mut buf = Vec::new();
        loop {
            print_prompt(&manager);
            buf.clear();
            let read = tokio::select! {
                read = stdin.read_until(b'\n', &mut buf) => read,
                _ = tokio::signal::ctrl_c() => interrupt(&mut manager),
            };
            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "reading stdin failed");
                    println!("Error reading input: {e}");
                    break;
                }
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                println!("Skipping input that is not valid UTF-8.");
                continue;
            };

            if handle_line(&mut manager, line).await == Flow::Exit {
                break;
            }
        }

        finish(&mut manager);
        Ok(())
    }
}

/// Handle one console line: a command or a message for the current session.
///
/// Failures are printed and the loop carries on; only `/exit` ends it.
pub async fn handle_line(manager: &mut SessionManager, line: &str) -> Flow {
    let line = line.trim();
    if line.is_empty() {
        return Flow::Continue;
    }

    match Command::parse(line) {
        Some(Ok(Command::Exit)) => return Flow::Exit,
        Some(Ok(command)) => {
            if let Err(e) = handle_command(manager, command).await {
                tracing::warn!(error = %e, "command failed");
                println!("Error: {e}");
            }
        }
        Some(Err(e)) => println!("{e}"),
        None => send_line(manager, line).await,
    }
    Flow::Continue
}

async fn send_line(manager: &mut SessionManager, line: &str) {
    let session = match manager.current() {
        Ok(session) => session,
        Err(e) => {
            println!("Error: {e}");
            return;
        }
    };
    let sent = tokio::select! {
        sent = session.send_message(line) => sent,
        _ = tokio::signal::ctrl_c() => interrupt(manager),
    };
    match sent {
        Ok(outcome) => {
            println!("{}: {}", manager.identity().name, outcome.value);
            report_advisories(&outcome);
            if let Ok(session) = manager.current() {
                print_token_usage(session).await;
            }
        }
        Err(e) => println!("Error: {e}"),
    }
}

/// Save and terminate the process on Ctrl-C.
fn interrupt(manager: &mut SessionManager) -> ! {
    println!();
    finish(manager);
    std::process::exit(INTERRUPTED_EXIT_CODE);
}

fn finish(manager: &mut SessionManager) {
    match manager.cleanup_and_save() {
        Ok(()) => {
            if let Some(id) = manager.current_id() {
                println!("Goodbye. Resume with --session-id {id}");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "final save failed");
            println!("Warning: session could not be saved: {e}");
        }
    }
}

fn print_prompt(manager: &SessionManager) {
    let short: String = manager.current_id().unwrap_or("-").chars().take(8).collect();
    print!("{} [{}]> ", manager.identity().name, short);
    let _ = std::io::stdout().flush();
}

fn print_session_banner(manager: &mut SessionManager) -> anyhow::Result<()> {
    let session = manager.current()?;
    println!(
        "Session {} ({} messages). Type /help for commands.",
        session.id(),
        session.history().len()
    );
    if !session.is_empty() {
        println!("{}", history_summary(session.history(), &session.identity().name));
    }
    Ok(())
}

async fn print_token_usage(session: &Session) {
    match session.token_usage().await {
        Ok(usage) => println!("{usage}"),
        Err(e) => println!("Could not count tokens: {e}"),
    }
}

fn report_advisories<T>(outcome: &Advised<T>) {
    for advisory in &outcome.advisories {
        println!("Warning: {advisory}");
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SUMMARY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Exchange count plus the last exchange, each side cut to a short preview.
pub fn history_summary(history: &[Message], assistant_name: &str) -> String {
    let [.., user, assistant] = history else {
        return "No history yet.".to_string();
    };
    format!(
        "{} exchange(s) so far.\nLast exchange:\n  You: {}\n  {assistant_name}: {}",
        history.len() / 2,
        preview(&user.text),
        preview(&assistant.text)
    )
}

async fn handle_command(manager: &mut SessionManager, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Switch(id) => {
            if manager.current_id() == Some(id.as_str()) {
                println!("Already in session {id}.");
                return Ok(());
            }
            let outcome = manager.switch_to_session(&id);
            if let Some(e) = &outcome.save_error {
                println!("Warning: previous session was not saved: {e}");
            }
            match &outcome.load_error {
                None => {
                    println!(
                        "Switched to session {}{}",
                        outcome.session_id,
                        if outcome.had_history { "" } else { " (empty)" }
                    );
                    if outcome.had_history {
                        let session = manager.current()?;
                        println!("{}", history_summary(session.history(), &session.identity().name));
                    }
                }
                Some(e) => println!(
                    "Could not switch to {id}: {e}. Still in session {}",
                    outcome.session_id
                ),
            }
        }
        Command::List => {
            let current = manager.current_id().map(str::to_string);
            let sessions = manager.list_sessions()?;
            if sessions.is_empty() {
                println!("No stored sessions.");
            }
            for meta in sessions {
                let marker = if current.as_deref() == Some(meta.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                let when = meta
                    .last_activity
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                match meta.error {
                    Some(err) => println!("{marker} {}  (unreadable: {err})", meta.id),
                    None => println!(
                        "{marker} {}  {} messages  last active {when}",
                        meta.id, meta.message_count
                    ),
                }
            }
        }
        Command::Display => {
            let session = manager.current()?;
            if session.history().is_empty() {
                println!("(no messages)");
            }
            for msg in session.history() {
                println!(
                    "[{}] {}: {}",
                    msg.timestamp.format("%H:%M:%S"),
                    msg.role,
                    msg.text
                );
            }
        }
        Command::Pop => {
            let session = manager.current()?;
            let outcome = session.pop_last_exchange();
            if outcome.value {
                println!("Removed the last exchange.");
                println!("{}", history_summary(session.history(), &session.identity().name));
            } else {
                println!("Nothing to remove.");
            }
            report_advisories(&outcome);
        }
        Command::Clear => match manager.current()?.clear_history() {
            Ok(outcome) => {
                println!("History cleared.");
                report_advisories(&outcome);
            }
            Err(e) => println!("History cleared, but the backend could not restart: {e}"),
        },
        Command::New => {
            let outcome = manager.create_new_session(true)?;
            if let Some(e) = &outcome.save_error {
                println!("Warning: previous session was not saved: {e}");
            }
            println!("Started session {}", outcome.session_id);
        }
        Command::Remove => {
            let outcome = manager.remove_current_and_create_new()?;
            match (&outcome.removed_id, &outcome.error) {
                (Some(id), None) => println!("Removed session {id}"),
                (Some(id), Some(e)) => println!("Could not remove session {id}: {e}"),
                (None, _) => {}
            }
            println!("Started session {}", outcome.session_id);
        }
        Command::Tokens => print_token_usage(manager.current()?).await,
        Command::Help => println!("{HELP}"),
        Command::Exit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_empty_history() {
        assert_eq!(history_summary(&[], "Ada"), "No history yet.");
    }

    #[test]
    fn summary_counts_exchanges_and_shows_the_last_one() {
        let history = vec![
            Message::user("first"),
            Message::assistant("one"),
            Message::user("second"),
            Message::assistant("two"),
        ];
        let summary = history_summary(&history, "Ada");
        assert!(summary.starts_with("2 exchange(s) so far."));
        assert!(summary.contains("You: second"));
        assert!(summary.contains("Ada: two"));
        assert!(!summary.contains("first"));
    }

    #[test]
    fn summary_truncates_long_messages() {
        let long = "x".repeat(150);
        let history = vec![Message::user(&long), Message::assistant("short")];
        let summary = history_summary(&history, "Ada");
        assert!(summary.contains(&format!("You: {}...", "x".repeat(100))));
        assert!(!summary.contains(&"x".repeat(101)));
        assert!(summary.contains("Ada: short"));
    }

    #[test]
    fn preview_counts_characters() {
        let text = "é".repeat(100);
        assert_eq!(preview(&text), text);
    }
}
