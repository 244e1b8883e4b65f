//! Migration command dispatcher
//!
//! Maps the `migrate`, `migration`, `downgrade` and `history` subcommands
//! onto invocations of an external schema migration tool.

use std::io::Write;
use std::path::Path;
use std::process::Command;

/// Migration tool invoked when none is configured
pub const DEFAULT_TOOL: &str = "alembic";

/// Env file loaded before dispatch
pub const DEFAULT_ENV_FILE: &str = ".env";

pub const USAGE: &str = "\
Usage: fastcms-migrate <command> [args]

Commands:
  migrate               Apply all pending migrations
  migration \"message\"   Create a new migration with the given message
  downgrade             Revert the last migration
  history               Show migration history
";

/// Migration error
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("Migration message is required.")]
    MissingMessage,
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A recognized migration operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationCommand {
    /// Apply everything up to head
    Upgrade,
    /// Autogenerate a revision
    Revision { message: String },
    /// Revert one step
    Downgrade,
    /// Verbose history
    History,
}

impl MigrationCommand {
    /// Subcommand name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upgrade => "migrate",
            Self::Revision { .. } => "migration",
            Self::Downgrade => "downgrade",
            Self::History => "history",
        }
    }

    /// Arguments passed to the migration tool
    pub fn tool_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::Upgrade => &["upgrade", "head"],
            Self::Revision { message } => {
                return vec![
                    "revision".to_string(),
                    "--autogenerate".to_string(),
                    "-m".to_string(),
                    message.clone(),
                ]
            }
            Self::Downgrade => &["downgrade", "-1"],
            Self::History => &["history", "--verbose"],
        };
        args.iter().map(|a| a.to_string()).collect()
    }
}

/// Result of parsing the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Run(MigrationCommand),
    Usage,
}

/// Parse subcommand arguments (program name excluded)
pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Dispatch, MigrateError> {
    let command = match args.first().map(|a| a.as_ref()) {
        Some("migrate") => MigrationCommand::Upgrade,
        Some("migration") => match args.get(1).map(|a| a.as_ref()) {
            Some(message) if !message.is_empty() => MigrationCommand::Revision {
                message: message.to_string(),
            },
            _ => return Err(MigrateError::MissingMessage),
        },
        Some("downgrade") => MigrationCommand::Downgrade,
        Some("history") => MigrationCommand::History,
        _ => return Ok(Dispatch::Usage),
    };

    Ok(Dispatch::Run(command))
}

/// Runs the migration tool and reports its exit code
pub trait MigrationRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<i32, MigrateError>;
}

/// Spawns the tool as a child process sharing our stdio
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl MigrationRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<i32, MigrateError> {
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| MigrateError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Killed by a signal
        Ok(status.code().unwrap_or(1))
    }
}

/// Load `KEY=value` pairs from an env file if it exists
pub fn load_env_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    match dotenv::from_path(path) {
        Ok(()) => {
            tracing::debug!("Loaded environment from {}", path.display());
            true
        }
        Err(e) => {
            tracing::warn!("Failed to load {}: {}", path.display(), e);
            false
        }
    }
}

/// Dispatch a command line and return the process exit code
pub fn run_cli<S: AsRef<str>>(
    args: &[S],
    tool: &str,
    runner: &dyn MigrationRunner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> i32 {
    let command = match parse(args) {
        Ok(Dispatch::Run(command)) => command,
        Ok(Dispatch::Usage) => {
            let _ = write!(out, "{}", USAGE);
            return 0;
        }
        Err(e) => {
            let _ = writeln!(err, "Error: {}", e);
            let _ = write!(err, "{}", USAGE);
            return 1;
        }
    };

    let tool_args = command.tool_args();
    tracing::info!(command = command.name(), "Running {} {}", tool, tool_args.join(" "));

    match runner.run(tool, &tool_args) {
        Ok(code) => {
            if code != 0 {
                tracing::error!(command = command.name(), code, "Migration tool failed");
            }
            code
        }
        Err(e) => {
            tracing::error!("{}", e);
            let _ = writeln!(err, "Error: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingRunner {
        calls: RefCell<Vec<(String, Vec<String>)>>,
        code: i32,
    }

    impl RecordingRunner {
        fn new(code: i32) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                code,
            }
        }
    }

    impl MigrationRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[String]) -> Result<i32, MigrateError> {
            self.calls
                .borrow_mut()
                .push((program.to_string(), args.to_vec()));
            Ok(self.code)
        }
    }

    struct FailingRunner;

    impl MigrationRunner for FailingRunner {
        fn run(&self, program: &str, _args: &[String]) -> Result<i32, MigrateError> {
            Err(MigrateError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        }
    }

    fn dispatch(args: &[&str], runner: &dyn MigrationRunner) -> (i32, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = run_cli(args, DEFAULT_TOOL, runner, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            parse(&["migrate"]).unwrap(),
            Dispatch::Run(MigrationCommand::Upgrade)
        );
        assert_eq!(
            parse(&["migration", "add posts"]).unwrap(),
            Dispatch::Run(MigrationCommand::Revision {
                message: "add posts".to_string()
            })
        );
        assert_eq!(parse(&["history", "extra"]).unwrap(), Dispatch::Run(MigrationCommand::History));
        assert_eq!(parse::<&str>(&[]).unwrap(), Dispatch::Usage);
        assert_eq!(parse(&["upgrade"]).unwrap(), Dispatch::Usage);
        assert!(matches!(parse(&["migration"]), Err(MigrateError::MissingMessage)));
        assert!(matches!(parse(&["migration", ""]), Err(MigrateError::MissingMessage)));
    }

    #[test]
    fn test_tool_args() {
        assert_eq!(MigrationCommand::Upgrade.tool_args(), vec!["upgrade", "head"]);
        assert_eq!(MigrationCommand::Downgrade.tool_args(), vec!["downgrade", "-1"]);
        assert_eq!(MigrationCommand::History.tool_args(), vec!["history", "--verbose"]);
        assert_eq!(
            MigrationCommand::Revision {
                message: "init".to_string()
            }
            .tool_args(),
            vec!["revision", "--autogenerate", "-m", "init"]
        );
    }

    #[test]
    fn test_each_command_invokes_tool_once() {
        let cases: [(&[&str], &[&str]); 4] = [
            (&["migrate"], &["upgrade", "head"]),
            (&["migration", "create users"], &["revision", "--autogenerate", "-m", "create users"]),
            (&["downgrade"], &["downgrade", "-1"]),
            (&["history"], &["history", "--verbose"]),
        ];

        for (args, expected) in cases {
            let runner = RecordingRunner::new(0);
            let (code, _, _) = dispatch(args, &runner);

            assert_eq!(code, 0);
            let calls = runner.calls.borrow();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].0, "alembic");
            assert_eq!(calls[0].1, expected);
        }
    }

    #[test]
    fn test_missing_message() {
        let runner = RecordingRunner::new(0);
        let (code, out, err) = dispatch(&["migration"], &runner);

        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert!(err.starts_with("Error: Migration message is required."));
        assert!(err.contains("Usage:"));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_unknown_command_prints_usage() {
        let runner = RecordingRunner::new(0);

        let (code, out, _) = dispatch(&["seed"], &runner);
        assert_eq!(code, 0);
        assert!(out.contains("Usage:"));

        let (code, out, _) = dispatch(&[], &runner);
        assert_eq!(code, 0);
        assert_eq!(out, USAGE);
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_tool_failure_propagates() {
        let (code, _, _) = dispatch(&["migrate"], &RecordingRunner::new(3));
        assert_eq!(code, 3);

        let (code, _, err) = dispatch(&["history"], &FailingRunner);
        assert_eq!(code, 1);
        assert!(err.contains("Failed to run alembic"));
    }

    #[test]
    fn test_load_env_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(".env");
        assert!(!load_env_file(&path));

        std::fs::write(&path, "FASTCMS_MIGRATE_TEST_VAR=loaded\n").unwrap();
        assert!(load_env_file(&path));
        assert_eq!(std::env::var("FASTCMS_MIGRATE_TEST_VAR").unwrap(), "loaded");
    }
}
