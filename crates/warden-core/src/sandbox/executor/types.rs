//! Launch request and result types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::process::Child;

use crate::sandbox::platform::Primitive;

/// Variables passed through from the parent environment
pub const ENV_ALLOW_LIST: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "TERM", "USER", "TMPDIR"];

/// A program invocation, before any isolation is attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Set on top of the allow-listed parent variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    /// `sh -c <script>`
    pub fn shell(script: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self::new("sh", cwd).arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-quoted command line for logs and listings
    pub fn display(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }

    /// The child's environment: allow-listed parent variables, then explicit ones
    pub fn child_environment(&self) -> Vec<(String, String)> {
        let mut env: BTreeMap<String, String> = ENV_ALLOW_LIST
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.into_iter().collect()
    }
}

/// Per-launch choices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Run even when some required primitives are unavailable, recording them as degraded
    #[serde(default)]
    pub best_effort: bool,
}

impl LaunchOptions {
    pub fn strict() -> Self {
        Self { best_effort: false }
    }

    pub fn best_effort() -> Self {
        Self { best_effort: true }
    }
}

/// A child started under isolation
#[derive(Debug)]
pub struct LaunchedProcess {
    pub child: Child,
    pub backend: &'static str,
    /// Primitives the profile required but the launch could not enforce
    pub degraded: Vec<Primitive>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_arguments() {
        let spec = CommandSpec::shell("echo 'hi there'", "/tmp");
        let shown = spec.display();
        assert!(shown.starts_with("sh -c '"));
        assert_eq!(
            shell_words::split(&shown).unwrap(),
            vec!["sh", "-c", "echo 'hi there'"]
        );
    }

    #[test]
    fn test_child_environment_is_allow_listed() {
        let spec = CommandSpec::new("env", "/tmp").env("WARDEN_TEST_VAR", "1");
        let env = spec.child_environment();
        assert!(env.iter().all(|(k, _)| ENV_ALLOW_LIST.contains(&k.as_str())
            || k == "WARDEN_TEST_VAR"));
        assert!(env.contains(&("WARDEN_TEST_VAR".to_string(), "1".to_string())));
    }

    #[test]
    fn test_explicit_env_overrides_parent() {
        let spec = CommandSpec::new("env", "/tmp").env("PATH", "/only/here");
        let env = spec.child_environment();
        let path: Vec<_> = env.iter().filter(|(k, _)| k == "PATH").collect();
        assert_eq!(path, vec![&("PATH".to_string(), "/only/here".to_string())]);
    }
}
