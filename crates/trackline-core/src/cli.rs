use std::ffi::OsString;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{ArgAction, Parser};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::intent::{Intent, Outcome};
use crate::render::Renderer;
use crate::workspace::Workspace;

const PROMPT: &str = "trackline> ";

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "trackline",
    version,
    about = "Trackline: terminal client for the task tracking service",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Config file to read instead of $TRACKLINERC or ~/.tracklinerc.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Sign in before the first command.
    #[arg(long = "email", requires = "password")]
    pub email: Option<String>,

    #[arg(long = "password", requires = "email")]
    pub password: Option<String>,

    /// Run one command and exit instead of starting the shell.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// Drives a [`Workspace`] from text commands.
pub struct Shell<'a> {
    runtime: &'a Runtime,
    workspace: Workspace,
    renderer: Renderer,
}

impl<'a> Shell<'a> {
    pub fn new(runtime: &'a Runtime, workspace: Workspace, renderer: Renderer) -> Self {
        Self {
            runtime,
            workspace,
            renderer,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    #[tracing::instrument(skip_all, fields(email = %email))]
    pub fn sign_in<W: Write>(
        &mut self,
        out: &mut W,
        email: &str,
        password: &str,
    ) -> anyhow::Result<()> {
        self.runtime
            .block_on(self.workspace.login(email, password))
            .with_context(|| format!("failed to sign in as {email}"))?;
        self.renderer.render_view(out, &self.workspace.view())
    }

    /// Executes one command line. Returns `false` once the user asked to quit.
    ///
    /// Command failures are reported to `out` and never end the shell.
    pub fn run_line<W: Write>(&mut self, out: &mut W, line: &str) -> anyhow::Result<bool> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(true);
        }

        let intent = match line.parse::<Intent>() {
            Ok(intent) => intent,
            Err(err) => {
                self.renderer.render_error(out, &err)?;
                return Ok(true);
            }
        };
        let name = intent.name();

        match self.runtime.block_on(intent.execute(&mut self.workspace)) {
            Ok(Outcome::Quit) => return Ok(false),
            Ok(outcome) => {
                info!(intent = name, "command succeeded");
                self.renderer.render_outcome(out, &outcome)?;
                if !matches!(outcome, Outcome::Help | Outcome::User(_)) {
                    self.renderer.render_view(out, &self.workspace.view())?;
                }
            }
            Err(err) => {
                warn!(intent = name, kind = err.kind(), error = %err, "command failed");
                self.renderer.render_error(out, &err)?;
            }
        }
        Ok(true)
    }

    #[tracing::instrument(skip_all)]
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        out: &mut W,
        prompt: bool,
    ) -> anyhow::Result<()> {
        if prompt {
            writeln!(out, "type help for commands, quit to leave")?;
        }
        let mut lines = input.lines();
        loop {
            if prompt {
                write!(out, "{PROMPT}")?;
                out.flush().context("failed to flush prompt")?;
            }
            let Some(line) = lines.next() else {
                debug!("input closed");
                break;
            };
            let line = line.context("failed to read command")?;
            if !self.run_line(out, &line)? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::io::Cursor;
    use std::sync::Arc;

    use clap::Parser;

    use super::{GlobalCli, Shell, preprocess_args};
    use crate::render::Renderer;
    use crate::testing::FakeTransport;
    use crate::transport::Method;
    use crate::workspace::{Workspace, WorkspaceOptions};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime")
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let raw: Vec<OsString> = ["trackline", "rc.tasks.page_size=5", "projects"]
            .into_iter()
            .map(OsString::from)
            .collect();
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(
            pre.rc_overrides,
            vec![("rc.tasks.page_size".to_string(), "5".to_string())]
        );

        let cli = GlobalCli::parse_from(pre.cleaned_args);
        assert_eq!(cli.rest, vec![OsString::from("projects")]);
    }

    #[test]
    fn parses_connection_flags() {
        let cli = GlobalCli::parse_from([
            "trackline",
            "-vv",
            "--base-url",
            "http://127.0.0.1:9000",
            "--rc",
            "comments.limit=3",
            "--email",
            "me@example.com",
            "--password",
            "pw",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.base_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(cli.rc_overrides[0].key, "comments.limit");
        assert_eq!(cli.email.as_deref(), Some("me@example.com"));
        assert!(GlobalCli::try_parse_from(["trackline", "--email", "me@example.com"]).is_err());
    }

    #[test]
    fn shell_reports_failures_and_keeps_going() {
        let runtime = runtime();
        let transport = Arc::new(FakeTransport::new());
        transport.route(
            Method::Post,
            "api/v1/auth/login",
            200,
            r#"{"access_token":"abc"}"#,
        );
        transport.route(
            Method::Get,
            "api/v1/projects/",
            200,
            r#"[{"id":1,"name":"Alpha"}]"#,
        );
        let workspace =
            Workspace::new(transport.clone(), WorkspaceOptions::default()).expect("workspace");
        let mut shell = Shell::new(&runtime, workspace, Renderer::with_color(false));

        let script = "new task Orphan\nbogus\nlogin me@example.com pw\n# note\nquit\nprojects\n";
        let mut out = Vec::new();
        shell
            .run(Cursor::new(script), &mut out, false)
            .expect("shell");
        let text = String::from_utf8(out).expect("utf8");

        assert!(text.contains("error: invalid input: select a project before creating a task"));
        assert!(text.contains("unknown command"));
        assert!(text.contains("Alpha"));
        assert!(shell.workspace().view().is_authenticated);
        assert_eq!(transport.requests_to(Method::Get, "api/v1/projects/").len(), 1);
    }
}
