#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use askuser::core::{project_key, FeedbackResult, ProjectStore};
    use tempfile::TempDir;

    /// Run `askuser session` against a scripted stdin and parse the single
    /// JSON result line it leaves on stdout.
    fn run_host(dir: &TempDir, stdin: &str) -> Result<FeedbackResult, Box<dyn std::error::Error>> {
        let settings = dir.path().join("projects.toml");
        let output = Command::cargo_bin("askuser")?
            .arg("session")
            .arg("--dir")
            .arg(dir.path())
            .arg("--prompt")
            .arg("anything to add?")
            .arg("--settings-file")
            .arg(&settings)
            .write_stdin(stdin)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let text = String::from_utf8(output)?;
        assert_eq!(
            text.trim_end_matches('\n').lines().count(),
            1,
            "stdout should carry exactly one result line, got: {:?}",
            text
        );
        Ok(serde_json::from_str(text.trim())?)
    }

    #[test]
    fn test_closed_stdin_reports_a_cancel() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let result = run_host(&dir, "")?;

        assert_eq!(result.interactive_feedback, "");
        assert_eq!(result.logs, "");
        Ok(())
    }

    #[test]
    fn test_scripted_send_returns_the_typed_feedback() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let result = run_host(&dir, "The tests pass locally\n:send\n")?;

        assert_eq!(result.interactive_feedback, "The tests pass locally");
        assert_eq!(result.logs, "");
        Ok(())
    }

    #[test]
    fn test_draft_lines_are_joined_with_newlines() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let result = run_host(&dir, "line one\nline two\n:send\n")?;

        assert_eq!(result.interactive_feedback, "line one\nline two");
        Ok(())
    }

    #[test]
    fn test_run_without_a_command_is_logged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let result = run_host(&dir, "done checking\n:run\n:send\n")?;

        assert_eq!(result.logs, "Please enter a command to run.\n");
        assert_eq!(result.interactive_feedback, "done checking");
        Ok(())
    }

    #[test]
    fn test_command_section_use_is_remembered() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        run_host(&dir, ":run\n:send\n")?;

        let store = ProjectStore::open(dir.path().join("projects.toml"))?;
        let settings = store.get(&project_key(&dir.path().to_string_lossy()));
        assert!(
            settings.command_section_visible,
            "using :run should mark the command section visible"
        );
        Ok(())
    }
}
