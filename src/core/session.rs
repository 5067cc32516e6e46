use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::core::protocol::FeedbackResult;
use crate::core::runner::CommandRunner;
use crate::core::settings::{project_key, ProjectSettings, ProjectStore};
use crate::utils::env::user_environment;

/// How often the session looks for an exited command.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Delay before a remembered command starts when auto-execute is on.
const AUTO_RUN_DELAY: Duration = Duration::from_millis(100);

const DISPLAY_BUFFER: usize = 1024;

/// What a frontend can ask the session to do.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Finish the session with the given feedback text.
    Submit(String),
    /// Finish the session with empty feedback.
    Cancel,
    /// Start the draft command, or stop the one that is running.
    RunCommand,
    /// Stop the running command without starting a new one.
    StopCommand,
    /// Replace the draft command line.
    CommandEdited(String),
    /// Flip the auto-execute flag for the next session.
    AutoExecuteChanged(bool),
    /// Persist the draft command and auto-execute flag.
    SaveSettings,
    /// Reset the visible log area. The captured buffer is kept.
    ClearLogs,
    /// Show or hide the command section, persisted immediately.
    ToggleCommandSection(bool),
}

/// What the session tells its frontends.
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    Opened {
        prompt: String,
        directory: String,
        settings: ProjectSettings,
    },
    LogLine(String),
    LogsCleared,
    RunStateChanged {
        running: bool,
    },
    Closed,
}

/// Handles for driving one session from a frontend.
#[derive(Debug, Clone)]
pub struct SessionChannels {
    pub ui: mpsc::UnboundedSender<UiEvent>,
    pub display: broadcast::Sender<DisplayEvent>,
}

/// One interactive feedback session: a prompt shown to the user, a log
/// buffer, an optional attached command, and the settings remembered for
/// the project.
///
/// The session is driven entirely through [`UiEvent`]s and reports back
/// through broadcast [`DisplayEvent`]s. Subscribe to the display channel
/// before calling [`FeedbackSession::run`], otherwise the opening event
/// is lost.
pub struct FeedbackSession {
    prompt: String,
    project_directory: PathBuf,
    key: String,
    settings: ProjectSettings,
    store: ProjectStore,
    logs: Vec<String>,
    runner: Option<CommandRunner>,
    ui_rx: mpsc::UnboundedReceiver<UiEvent>,
    display_tx: broadcast::Sender<DisplayEvent>,
    line_tx: mpsc::UnboundedSender<String>,
    line_rx: mpsc::UnboundedReceiver<String>,
    outcome: Option<FeedbackResult>,
}

impl FeedbackSession {
    /// Build a session for one request and hand back the channel bundle
    /// frontends drive it with. The session keeps no sender of its own, so
    /// dropping every bundle ends the session as a cancellation.
    pub fn new(
        prompt: impl Into<String>,
        project_directory: impl Into<PathBuf>,
        store: ProjectStore,
    ) -> (Self, SessionChannels) {
        let project_directory = project_directory.into();
        let key = project_key(&project_directory.to_string_lossy());
        let settings = store.get(&key);

        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (display_tx, _) = broadcast::channel(DISPLAY_BUFFER);
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        let channels = SessionChannels {
            ui: ui_tx,
            display: display_tx.clone(),
        };
        let session = Self {
            prompt: prompt.into(),
            project_directory,
            key,
            settings,
            store,
            logs: Vec::new(),
            runner: None,
            ui_rx,
            display_tx,
            line_tx,
            line_rx,
            outcome: None,
        };
        (session, channels)
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    /// Drive the session until it is closed and return its result.
    pub async fn run(mut self) -> FeedbackResult {
        let _ = self.display_tx.send(DisplayEvent::Opened {
            prompt: self.prompt.clone(),
            directory: self.project_directory.display().to_string(),
            settings: self.settings.clone(),
        });

        let mut auto_pending =
            self.settings.execute_automatically && !self.settings.run_command.is_empty();
        let auto_delay = tokio::time::sleep(AUTO_RUN_DELAY);
        tokio::pin!(auto_delay);

        let mut exit_poll = tokio::time::interval(EXIT_POLL_INTERVAL);

        while self.outcome.is_none() {
            tokio::select! {
                event = self.ui_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        // Every frontend handle is gone, nobody can answer.
                        None => self.close(String::new()).await,
                    }
                }
                line = self.line_rx.recv() => {
                    if let Some(line) = line {
                        self.append_log(line);
                    }
                }
                _ = exit_poll.tick() => {
                    self.poll_runner();
                }
                _ = &mut auto_delay, if auto_pending => {
                    auto_pending = false;
                    self.start_run().await;
                }
            }
        }

        self.outcome.take().unwrap_or_default()
    }

    async fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Submit(text) => self.close(text.trim().to_string()).await,
            UiEvent::Cancel => self.close(String::new()).await,
            UiEvent::RunCommand => self.start_run().await,
            UiEvent::StopCommand => {
                if self.runner.is_some() {
                    self.append_log("Stopping current process...".to_string());
                    self.stop_run().await;
                }
            }
            UiEvent::CommandEdited(text) => {
                self.settings.run_command = text;
            }
            UiEvent::AutoExecuteChanged(enabled) => {
                self.settings.execute_automatically = enabled;
            }
            UiEvent::SaveSettings => self.save_settings(),
            UiEvent::ClearLogs => {
                let _ = self.display_tx.send(DisplayEvent::LogsCleared);
            }
            UiEvent::ToggleCommandSection(visible) => {
                self.settings.command_section_visible = visible;
                self.persist_section_visibility();
            }
        }
    }

    /// Start the draft command. When a command is already attached the
    /// request stops it instead; a fresh run only begins once its exit has
    /// been reported.
    async fn start_run(&mut self) {
        if self.runner.is_some() {
            self.append_log("Stopping current process...".to_string());
            self.stop_run().await;
            return;
        }

        let command = self.settings.run_command.clone();
        if command.trim().is_empty() {
            self.append_log("Please enter a command to run.".to_string());
            return;
        }

        self.append_log(format!("$ {}", command));
        self.set_running(true);

        let environment = user_environment().await;
        match CommandRunner::spawn(
            &command,
            &self.project_directory,
            &environment,
            self.line_tx.clone(),
        ) {
            Ok(runner) => self.runner = Some(runner),
            Err(e) => {
                self.append_log(format!("Error running command: {}", e));
                self.set_running(false);
            }
        }
    }

    async fn stop_run(&mut self) {
        if let Some(runner) = self.runner.as_mut() {
            runner.stop().await;
        }
    }

    /// Exit check on the poll tick. Reports the exit once and releases the
    /// runner so the next run can start.
    fn poll_runner(&mut self) {
        let Some(runner) = self.runner.as_mut() else {
            return;
        };
        if let Some(code) = runner.poll_exit() {
            self.runner = None;
            self.append_log(String::new());
            self.append_log(format!("Process exited with code {}", code));
            self.set_running(false);
        }
    }

    fn save_settings(&mut self) {
        self.store.set(&self.key, self.settings.clone());
        match self.store.save() {
            Ok(()) => self.append_log("Configuration saved for this project.".to_string()),
            Err(e) => {
                tracing::warn!("could not save project settings: {}", e);
                self.append_log(format!("Error saving configuration: {}", e));
            }
        }
    }

    /// Write back only the section visibility, leaving the stored command
    /// and auto-execute flag untouched until the user saves explicitly.
    fn persist_section_visibility(&mut self) {
        let mut stored = self.store.get(&self.key);
        if stored.command_section_visible == self.settings.command_section_visible {
            return;
        }
        stored.command_section_visible = self.settings.command_section_visible;
        self.store.set(&self.key, stored);
        if let Err(e) = self.store.save() {
            tracing::warn!("could not persist section visibility: {}", e);
        }
    }

    /// End the session with the given feedback. Stops any attached command
    /// and fixes the result; later calls keep the first result.
    pub async fn close(&mut self, feedback: String) {
        if self.outcome.is_some() {
            return;
        }
        if self.runner.is_some() {
            self.stop_run().await;
            self.runner = None;
        }
        self.persist_section_visibility();
        self.outcome = Some(FeedbackResult {
            logs: self.logs_text(),
            interactive_feedback: feedback,
        });
        let _ = self.display_tx.send(DisplayEvent::Closed);
    }

    fn append_log(&mut self, line: String) {
        let _ = self.display_tx.send(DisplayEvent::LogLine(line.clone()));
        self.logs.push(line);
    }

    fn set_running(&mut self, running: bool) {
        let _ = self.display_tx.send(DisplayEvent::RunStateChanged { running });
    }

    fn logs_text(&self) -> String {
        if self.logs.is_empty() {
            String::new()
        } else {
            let mut text = self.logs.join("\n");
            text.push('\n');
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session_in(dir: &TempDir) -> (FeedbackSession, SessionChannels) {
        let store = ProjectStore::open(dir.path().join("projects.toml")).unwrap();
        FeedbackSession::new("anything else?", dir.path(), store)
    }

    #[tokio::test]
    async fn logs_keep_order_and_end_with_a_newline() {
        let dir = TempDir::new().unwrap();
        let (mut session, _channels) = session_in(&dir);
        session.append_log("$ echo hi".to_string());
        session.append_log("hi".to_string());
        assert_eq!(session.logs_text(), "$ echo hi\nhi\n");
    }

    #[tokio::test]
    async fn empty_log_buffer_gives_empty_text() {
        let dir = TempDir::new().unwrap();
        let (session, _channels) = session_in(&dir);
        assert_eq!(session.logs_text(), "");
    }

    #[tokio::test]
    async fn close_keeps_the_first_result() {
        let dir = TempDir::new().unwrap();
        let (mut session, _channels) = session_in(&dir);
        session.close("first answer".to_string()).await;
        session.close("second answer".to_string()).await;

        let result = session.run().await;
        assert_eq!(result.interactive_feedback, "first answer");
    }

    #[tokio::test]
    async fn clear_logs_does_not_touch_the_buffer() {
        let dir = TempDir::new().unwrap();
        let (mut session, _channels) = session_in(&dir);
        session.append_log("kept".to_string());
        session.handle_event(UiEvent::ClearLogs).await;
        assert_eq!(session.logs_text(), "kept\n");
    }

    #[tokio::test]
    async fn run_request_without_a_command_only_logs_a_hint() {
        let dir = TempDir::new().unwrap();
        let (mut session, _channels) = session_in(&dir);
        session
            .handle_event(UiEvent::CommandEdited("   ".to_string()))
            .await;
        session.handle_event(UiEvent::RunCommand).await;
        assert_eq!(session.logs_text(), "Please enter a command to run.\n");
        assert!(session.runner.is_none());
    }
}
