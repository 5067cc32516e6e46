#[cfg(unix)]
#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;

    use askuser::core::CommandRunner;
    use askuser::utils::process_alive;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn inherited_env() -> HashMap<String, String> {
        std::env::vars().collect()
    }

    async fn next_line(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for output")
            .expect("output channel closed")
    }

    async fn wait_for_exit(runner: &mut CommandRunner) -> i32 {
        for _ in 0..100 {
            if let Some(code) = runner.poll_exit() {
                return code;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("command did not exit in time");
    }

    #[tokio::test]
    async fn test_output_is_streamed_line_by_line_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner =
            CommandRunner::spawn("printf 'one\\ntwo\\n'", Path::new("."), &inherited_env(), tx)
                .unwrap();

        assert_eq!(next_line(&mut rx).await, "one");
        assert_eq!(next_line(&mut rx).await, "two");
        assert_eq!(wait_for_exit(&mut runner).await, 0);
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut runner =
            CommandRunner::spawn("exit 7", Path::new("."), &inherited_env(), tx).unwrap();

        assert_eq!(wait_for_exit(&mut runner).await, 7);
    }

    #[tokio::test]
    async fn test_command_runs_in_the_given_directory() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = CommandRunner::spawn("pwd", dir.path(), &inherited_env(), tx).unwrap();

        let reported = std::fs::canonicalize(next_line(&mut rx).await).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
        wait_for_exit(&mut runner).await;
    }

    #[tokio::test]
    async fn test_command_sees_exactly_the_given_environment() {
        let mut env = HashMap::new();
        env.insert("FEEDBACK_MARKER".to_string(), "present".to_string());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = CommandRunner::spawn(
            "echo \"marker=$FEEDBACK_MARKER home=$HOME\"",
            Path::new("."),
            &env,
            tx,
        )
        .unwrap();

        // HOME was not in the environment map, so the shell must not see it.
        assert_eq!(next_line(&mut rx).await, "marker=present home=");
        wait_for_exit(&mut runner).await;
    }

    #[tokio::test]
    async fn test_stop_terminates_the_whole_process_tree() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = CommandRunner::spawn(
            "sleep 300 & echo $!; wait $!",
            Path::new("."),
            &inherited_env(),
            tx,
        )
        .unwrap();

        let sleeper: u32 = next_line(&mut rx).await.trim().parse().unwrap();
        assert!(process_alive(runner.pid()));
        assert!(process_alive(sleeper));

        runner.stop().await;

        assert!(!runner.is_running());
        assert!(
            !process_alive(sleeper),
            "descendant should be gone after stop"
        );
        assert!(!process_alive(runner.pid()));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut runner =
            CommandRunner::spawn("sleep 300", Path::new("."), &inherited_env(), tx).unwrap();

        runner.stop().await;
        let first = runner.poll_exit();
        runner.stop().await;
        assert_eq!(runner.poll_exit(), first);
    }

    #[tokio::test]
    async fn test_spawn_fails_for_a_missing_directory() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = CommandRunner::spawn(
            "echo unreachable",
            Path::new("/definitely/not/a/real/path"),
            &inherited_env(),
            tx,
        );
        assert!(result.is_err());
    }
}
