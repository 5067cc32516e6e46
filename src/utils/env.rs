use std::collections::HashMap;

#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolve the environment of the interactively logged-in user.
///
/// A broker started by a service manager carries a stripped-down environment
/// that is not what the user sees in their own shell, so commands are run
/// with the login shell's environment where it can be captured. Falls back to
/// this process's environment whenever resolution fails.
pub async fn user_environment() -> HashMap<String, String> {
    #[cfg(unix)]
    {
        match login_shell_environment().await {
            Ok(env) if !env.is_empty() => return env,
            Ok(_) => tracing::debug!("login shell reported an empty environment"),
            Err(e) => tracing::debug!("could not resolve login shell environment: {:#}", e),
        }
    }

    std::env::vars().collect()
}

#[cfg(unix)]
async fn login_shell_environment() -> anyhow::Result<HashMap<String, String>> {
    use anyhow::Context;

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let output = tokio::time::timeout(
        RESOLVE_TIMEOUT,
        tokio::process::Command::new(&shell).args(["-lc", "env"]).output(),
    )
    .await
    .context("login shell timed out")?
    .with_context(|| format!("failed to run {}", shell))?;

    if !output.status.success() {
        anyhow::bail!("login shell exited with {}", output.status);
    }

    Ok(parse_env_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Extract `KEY=VALUE` entries from `env` output. A multiline value,
/// such as an exported bash function, spans several raw lines there;
/// only lines whose key is a plain identifier are taken.
#[cfg(unix)]
fn parse_env_output(output: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for line in output.lines() {
        if let Some((key, value)) = line.split_once('=') {
            if is_identifier(key) {
                env.insert(key.to_string(), value.to_string());
            }
        }
    }
    env
}

#[cfg(unix)]
fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn environment_is_never_empty() {
        let env = user_environment().await;
        assert!(env.contains_key("PATH"));
    }

    #[cfg(unix)]
    #[test]
    fn shell_function_bodies_are_not_variables() {
        let output = concat!(
            "HOME=/home/me\n",
            "BASH_FUNC_greet%%=() {\n",
            "    echo hi=there\n",
            "}\n",
            "PATH=/usr/bin:/bin\n",
        );
        let env = parse_env_output(output);
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/me"));
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin:/bin"));
        assert_eq!(env.len(), 2);
    }
}
