//! Slash-option command line for the injector.
//!
//! Options are `/name` or `/name:value`. The grammar is part of the tool's
//! observable contract (scripts depend on it), so it is matched by hand
//! against a fixed table rather than generated. Later occurrences override
//! earlier ones, and anything that matches no table entry is ignored.

use shared::errors::InjectError;

/// How the target process is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Attach to a running process by id.
    Pid,
    /// Launch an executable and inject before it runs.
    Executable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgumentType {
    Help,
    Pid,
    Executable,
    WorkingDirectory,
    CommandLineArgs,
    Hook,
}

struct ArgumentInfo {
    name: &'static str,
    help: Option<&'static str>,
    kind: ArgumentType,
}

const ARGUMENTS: &[ArgumentInfo] = &[
    ArgumentInfo {
        name: "?",
        help: None,
        kind: ArgumentType::Help,
    },
    ArgumentInfo {
        name: "pid",
        help: Some("Injects the payload into an already running process"),
        kind: ArgumentType::Pid,
    },
    ArgumentInfo {
        name: "exe",
        help: Some("Runs an executable and then injects the payload into it"),
        kind: ArgumentType::Executable,
    },
    ArgumentInfo {
        name: "cwd",
        help: Some("Requires /exe, sets the working directory of the executable"),
        kind: ArgumentType::WorkingDirectory,
    },
    ArgumentInfo {
        name: "args",
        help: Some("Requires /exe, supplies command line arguments to the executable"),
        kind: ArgumentType::CommandLineArgs,
    },
    ArgumentInfo {
        name: "hook",
        help: Some("Provides the payload module to load"),
        kind: ArgumentType::Hook,
    },
];

/// Parsed command line.
#[derive(Debug, Default)]
pub struct Options {
    pub show_help: bool,
    pub target: Option<TargetKind>,
    /// PID string or executable path, depending on `target`.
    pub application: Option<String>,
    /// Payload module path. Mandatory for an injection run.
    pub hook: Option<String>,
    /// Only meaningful with [`TargetKind::Executable`]; silently unused
    /// otherwise.
    pub working_directory: Option<String>,
    pub command_line_args: String,
}

/// Classifies one argument against the table.
///
/// A match requires the full option name: `/p` is not `/pid`, and `/pidgin`
/// matches nothing. The value, where present, follows a colon.
fn check_argument(argument: &str) -> Option<(ArgumentType, Option<&str>)> {
    let rest = argument.strip_prefix('/')?;
    for info in ARGUMENTS {
        if let Some(tail) = rest.strip_prefix(info.name) {
            if tail.is_empty() {
                return Some((info.kind, None));
            }
            if let Some(value) = tail.strip_prefix(':') {
                return Some((info.kind, Some(value)));
            }
            // Shared prefix but a different option; keep scanning.
        }
    }
    None
}

/// Processes arguments in order (the program name already stripped). Help
/// aborts the scan early; its output wins regardless of everything else.
pub fn parse<I>(argv: I) -> Options
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();

    for argument in argv {
        if options.show_help {
            break;
        }
        match check_argument(&argument) {
            Some((ArgumentType::Help, _)) => options.show_help = true,
            Some((ArgumentType::Pid, value)) => {
                options.target = Some(TargetKind::Pid);
                options.application = value.map(str::to_owned);
            }
            Some((ArgumentType::Executable, value)) => {
                options.target = Some(TargetKind::Executable);
                options.application = value.map(str::to_owned);
            }
            Some((ArgumentType::WorkingDirectory, value)) => {
                options.working_directory = value.map(str::to_owned);
            }
            Some((ArgumentType::CommandLineArgs, value)) => {
                options.command_line_args = value.unwrap_or_default().to_owned();
            }
            Some((ArgumentType::Hook, value)) => {
                options.hook = value.map(str::to_owned);
            }
            // Unrecognized input is ignored, not fatal.
            None => {}
        }
    }

    options
}

/// Prints one line per documented option.
pub fn print_help() {
    for info in ARGUMENTS {
        if let Some(help) = info.help {
            println!("{:>4}: {}", info.name, help);
        }
    }
}

/// Parses the `/pid` value. Accepts decimal or `0x`-prefixed hex, mirroring
/// the base-0 C runtime conversion this tool historically used.
pub fn parse_pid(value: &str) -> Result<u32, InjectError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|_| InjectError::MalformedArgument(format!("process id '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_strs(args: &[&str]) -> Options {
        parse(args.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn attach_mode_populates_pid_and_hook() {
        let options = parse_strs(&["/pid:1234", "/hook:payload.dll"]);

        assert_eq!(options.target, Some(TargetKind::Pid));
        assert_eq!(options.application.as_deref(), Some("1234"));
        assert_eq!(options.hook.as_deref(), Some("payload.dll"));
        assert!(!options.show_help);
    }

    #[test]
    fn launch_mode_populates_all_four_fields() {
        let options = parse_strs(&[
            "/exe:app.exe",
            r"/cwd:C:\x",
            "/args:--flag",
            "/hook:payload.dll",
        ]);

        assert_eq!(options.target, Some(TargetKind::Executable));
        assert_eq!(options.application.as_deref(), Some("app.exe"));
        assert_eq!(options.working_directory.as_deref(), Some(r"C:\x"));
        assert_eq!(options.command_line_args, "--flag");
        assert_eq!(options.hook.as_deref(), Some("payload.dll"));
    }

    #[test]
    fn help_wins_regardless_of_other_arguments() {
        let options = parse_strs(&["/pid:1234", "/?", "/hook:payload.dll"]);

        assert!(options.show_help);
        // Scanning stopped at the help flag.
        assert!(options.hook.is_none());
    }

    #[test]
    fn unrecognized_arguments_are_ignored() {
        let options = parse_strs(&["/bogus:1", "not-an-option", "/pidgin", "/pid:42"]);

        assert_eq!(options.target, Some(TargetKind::Pid));
        assert_eq!(options.application.as_deref(), Some("42"));
    }

    #[test]
    fn later_occurrences_override_earlier_ones() {
        let options = parse_strs(&["/pid:1", "/pid:2", "/hook:a.dll", "/hook:b.dll"]);

        assert_eq!(options.application.as_deref(), Some("2"));
        assert_eq!(options.hook.as_deref(), Some("b.dll"));
    }

    #[test]
    fn pid_switch_without_value_leaves_application_unset() {
        let options = parse_strs(&["/pid"]);

        assert_eq!(options.target, Some(TargetKind::Pid));
        assert!(options.application.is_none());
    }

    #[test]
    fn pid_values_parse_decimal_and_hex() {
        assert_eq!(parse_pid("1234").unwrap(), 1234);
        assert_eq!(parse_pid("0x10").unwrap(), 16);
        assert!(matches!(
            parse_pid("twelve"),
            Err(InjectError::MalformedArgument(_))
        ));
    }
}
