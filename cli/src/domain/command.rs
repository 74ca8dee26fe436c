//! Typed remote shell command builder.
//!
//! Every argument is quoted on the way in, so values such as user-supplied
//! paths never reach the remote shell unescaped. Privilege elevation is
//! applied in exactly one place: [`RemoteCommand::render`].

use std::fmt;

/// The `uid` of the superuser.
pub const ROOT_UID: &str = "0";

/// How a command must be elevated for the acting identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Acting identity is root: commands run as-is.
    Root,
    /// Non-root with no secret: `sudo -n`, which fails instead of prompting.
    Passwordless,
    /// Non-root with a secret: `sudo -S`, secret fed once on stdin.
    Interactive,
}

impl Elevation {
    /// Pick the minimum elevation for `uid`, given whether a secret is known.
    #[must_use]
    pub fn for_identity(uid: &str, has_secret: bool) -> Self {
        if uid == ROOT_UID {
            Self::Root
        } else if has_secret {
            Self::Interactive
        } else {
            Self::Passwordless
        }
    }

    /// Prefix prepended to an elevated command line, if any.
    #[must_use]
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Root => None,
            Self::Passwordless => Some("sudo -n --"),
            Self::Interactive => Some("sudo -S -p '' --"),
        }
    }
}

/// A shell command line destined for the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    line: String,
    compound: bool,
}

impl RemoteCommand {
    /// Start a command with `program` (quoted like any other argument).
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            line: quote(program),
            compound: false,
        }
    }

    /// A fixed, trusted script line. Never pass runtime values here.
    #[must_use]
    pub fn script(line: &'static str) -> Self {
        Self {
            line: line.to_string(),
            compound: true,
        }
    }

    /// Append one quoted argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.line.push(' ');
        self.line.push_str(&quote(arg.as_ref()));
        self
    }

    /// Append several quoted arguments.
    #[must_use]
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }

    /// Prefix an environment assignment (`KEY=value cmd`).
    #[must_use]
    pub fn env(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.line = format!("{key}={} {}", quote(value.as_ref()), self.line);
        self
    }

    /// Redirect standard output into `path`.
    #[must_use]
    pub fn redirect_to(mut self, path: &str) -> Self {
        self.line.push_str(" > ");
        self.line.push_str(&quote(path));
        self.compound = true;
        self
    }

    /// Run `next` only if this command succeeds.
    #[must_use]
    pub fn and(self, next: RemoteCommand) -> Self {
        self.join("&&", next)
    }

    /// Pipe this command's output into `next`.
    #[must_use]
    pub fn pipe(self, next: RemoteCommand) -> Self {
        self.join("|", next)
    }

    fn join(mut self, op: &str, next: RemoteCommand) -> Self {
        self.line = format!("{} {op} {}", self.line, next.line);
        self.compound = true;
        self
    }

    /// Whether the line uses shell operators (and so needs `sh -c` to elevate).
    #[must_use]
    pub fn is_compound(&self) -> bool {
        self.compound
    }

    /// The unelevated command line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Render the command line for the given elevation.
    ///
    /// Simple commands keep their line verbatim after the prefix. Compound
    /// lines are wrapped in `sh -c` so the whole pipeline runs elevated.
    #[must_use]
    pub fn render(&self, elevation: Elevation) -> String {
        match elevation.prefix() {
            None => self.line.clone(),
            Some(prefix) if self.compound => format!("{prefix} sh -c {}", quote(&self.line)),
            Some(prefix) => format!("{prefix} {}", self.line),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// POSIX shell quoting. Safe words pass through untouched.
#[must_use]
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Remove `sudo` prompt banners from a captured error stream.
#[must_use]
pub fn strip_sudo_prompts(stderr: &str) -> String {
    stderr
        .lines()
        .map(|line| {
            // `sudo -S` writes its prompt without a newline, so it may prefix
            // the first real error line.
            match line.find("[sudo] password for ") {
                Some(start) => line[start..]
                    .find(':')
                    .map_or("", |colon| line[start + colon + 1..].trim_start()),
                None => line,
            }
        })
        .filter(|line| !line.is_empty() && *line != "Sorry, try again.")
        .collect::<Vec<_>>()
        .join("\n")
}
