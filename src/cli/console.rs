//! Line-oriented console frontend for a feedback session.
//!
//! The dialog renders on stderr and reads from stdin, leaving stdout free
//! for the session result. Plain lines accumulate in the feedback draft;
//! lines starting with `:` are commands.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::core::session::{DisplayEvent, SessionChannels, UiEvent};
use crate::core::settings::ProjectSettings;

struct Console {
    channels: SessionChannels,
    draft: Vec<String>,
    section_visible: bool,
}

/// Drive the dialog until the session closes. The display receiver must be
/// subscribed before the session starts so the opening event is seen.
pub async fn run_console(
    channels: SessionChannels,
    mut display_rx: broadcast::Receiver<DisplayEvent>,
) {
    let mut console = Console {
        channels,
        draft: Vec::new(),
        section_visible: false,
    };

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = display_rx.recv() => {
                match event {
                    Ok(DisplayEvent::Opened { prompt, directory, settings }) => {
                        console.section_visible = settings.command_section_visible;
                        render_opening(&prompt, &directory, &settings);
                    }
                    Ok(DisplayEvent::LogLine(line)) => eprintln!("{}", line),
                    Ok(DisplayEvent::LogsCleared) => eprintln!("(log display cleared)"),
                    Ok(DisplayEvent::RunStateChanged { .. }) => {}
                    Ok(DisplayEvent::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        eprintln!("(display fell behind, {} lines skipped)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => console.handle_input(&line),
                    Ok(None) => {
                        // Input closed under us, nobody left to answer.
                        stdin_open = false;
                        let _ = console.channels.ui.send(UiEvent::Cancel);
                    }
                    Err(e) => {
                        tracing::warn!("could not read from stdin: {}", e);
                        stdin_open = false;
                        let _ = console.channels.ui.send(UiEvent::Cancel);
                    }
                }
            }
        }
    }
}

impl Console {
    fn handle_input(&mut self, line: &str) {
        let Some(command) = line.trim().strip_prefix(':') else {
            self.draft.push(line.to_string());
            return;
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match name {
            "send" => {
                let _ = self.channels.ui.send(UiEvent::Submit(self.draft.join("\n")));
            }
            "cancel" => {
                let _ = self.channels.ui.send(UiEvent::Cancel);
            }
            "run" => {
                self.reveal_command_section();
                if !rest.is_empty() {
                    let _ = self.channels.ui.send(UiEvent::CommandEdited(rest.to_string()));
                }
                let _ = self.channels.ui.send(UiEvent::RunCommand);
            }
            "stop" => {
                self.reveal_command_section();
                let _ = self.channels.ui.send(UiEvent::StopCommand);
            }
            "auto" => {
                self.reveal_command_section();
                match rest {
                    "on" => {
                        let _ = self.channels.ui.send(UiEvent::AutoExecuteChanged(true));
                    }
                    "off" => {
                        let _ = self.channels.ui.send(UiEvent::AutoExecuteChanged(false));
                    }
                    _ => eprintln!("usage: :auto on|off"),
                }
            }
            "save" => {
                self.reveal_command_section();
                let _ = self.channels.ui.send(UiEvent::SaveSettings);
            }
            "clear" => {
                let _ = self.channels.ui.send(UiEvent::ClearLogs);
            }
            "help" => print_help(),
            _ => eprintln!("Unknown command :{} (:help lists commands)", name),
        }
    }

    /// Using any command-section control marks the section visible for the
    /// next session, as opening the section would in a full dialog.
    fn reveal_command_section(&mut self) {
        if !self.section_visible {
            self.section_visible = true;
            let _ = self.channels.ui.send(UiEvent::ToggleCommandSection(true));
        }
    }
}

fn render_opening(prompt: &str, directory: &str, settings: &ProjectSettings) {
    eprintln!();
    eprintln!("============================================================");
    eprintln!("Feedback requested");
    eprintln!("============================================================");
    eprintln!("{}", prompt);
    eprintln!();
    eprintln!("Working directory: {}", directory);
    if settings.run_command.is_empty() {
        eprintln!("Run command: (none)");
    } else {
        eprintln!(
            "Run command: {} (auto-run {})",
            settings.run_command,
            if settings.execute_automatically {
                "on"
            } else {
                "off"
            }
        );
    }
    eprintln!();
    eprintln!("Type your feedback, then :send to submit or :cancel to give up.");
    eprintln!(":help lists the command controls.");
    eprintln!("------------------------------------------------------------");
}

fn print_help() {
    eprintln!("Commands:");
    eprintln!("  :send          submit the feedback typed so far");
    eprintln!("  :cancel        end the session without feedback");
    eprintln!("  :run [cmd]     run the configured (or given) command; stops a running one");
    eprintln!("  :stop          stop the running command");
    eprintln!("  :auto on|off   run the command automatically next session");
    eprintln!("  :save          remember command and auto-run for this project");
    eprintln!("  :clear         clear the log display");
    eprintln!("  :help          show this help");
    eprintln!("Any other line is added to your feedback draft.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn console_with_channel() -> (Console, mpsc::UnboundedReceiver<UiEvent>) {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (display_tx, _) = broadcast::channel(16);
        let console = Console {
            channels: SessionChannels {
                ui: ui_tx,
                display: display_tx,
            },
            draft: Vec::new(),
            section_visible: true,
        };
        (console, ui_rx)
    }

    #[tokio::test]
    async fn plain_lines_build_the_draft_and_send_submits_them() {
        let (mut console, mut ui_rx) = console_with_channel();
        console.handle_input("first line");
        console.handle_input("second line");
        console.handle_input(":send");

        match ui_rx.recv().await {
            Some(UiEvent::Submit(text)) => assert_eq!(text, "first line\nsecond line"),
            other => panic!("expected submit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_with_argument_updates_the_command_first() {
        let (mut console, mut ui_rx) = console_with_channel();
        console.handle_input(":run cargo test");

        match ui_rx.recv().await {
            Some(UiEvent::CommandEdited(command)) => assert_eq!(command, "cargo test"),
            other => panic!("expected command edit, got {:?}", other),
        }
        assert!(matches!(ui_rx.recv().await, Some(UiEvent::RunCommand)));
    }

    #[tokio::test]
    async fn first_section_command_reveals_the_section() {
        let (mut console, mut ui_rx) = console_with_channel();
        console.section_visible = false;
        console.handle_input(":stop");

        assert!(matches!(
            ui_rx.recv().await,
            Some(UiEvent::ToggleCommandSection(true))
        ));
        assert!(matches!(ui_rx.recv().await, Some(UiEvent::StopCommand)));
    }
}
