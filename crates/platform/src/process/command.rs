use std::borrow::Cow;
use std::fmt;

use dsu_events::events::ProcessCommandDescriptor;

/// Command builder shared by process execution and script rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCommand {
    program: String,
    args: Vec<String>,
    upstream: Option<Box<PlatformCommand>>,
}

impl PlatformCommand {
    /// Create a new platform command
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            upstream: None,
        }
    }

    /// Add an argument to the command
    #[must_use]
    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments to the command
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_string()));
        self
    }

    /// Feed this command's stdin from the stdout of `upstream`
    #[must_use]
    pub fn pipe_from(mut self, upstream: PlatformCommand) -> Self {
        self.upstream = Some(Box::new(upstream));
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn upstream(&self) -> Option<&PlatformCommand> {
        self.upstream.as_deref()
    }

    /// Render as one POSIX shell line, quoting every word that needs it
    #[must_use]
    pub fn to_shell_line(&self) -> String {
        let mut line = String::new();
        if let Some(upstream) = &self.upstream {
            line.push_str(&upstream.to_shell_line());
            line.push_str(" | ");
        }
        line.push_str(&shell_quote(&self.program));
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line
    }

    #[must_use]
    pub fn descriptor(&self) -> ProcessCommandDescriptor {
        ProcessCommandDescriptor {
            program: self.program.clone(),
            args: self.args.clone(),
        }
    }
}

impl fmt::Display for PlatformCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_line())
    }
}

/// Quote `word` for a POSIX shell; safe words are returned untouched
#[must_use]
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}
