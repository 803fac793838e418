// ABOUTME: Slash command parsing for the console loop.
// ABOUTME: Maps `/switch`, `/session ...`, `/tokens`, `/help` and `/exit` lines onto Command values.

/// A parsed in-band control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Switch(String),
    List,
    Display,
    Pop,
    Clear,
    New,
    Remove,
    Tokens,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '/{0}'; try /help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
Commands:
  /switch <id>       save this session and switch to another
  /session list      list stored sessions
  /session display   show this session's history
  /session pop       drop the last exchange
  /session clear     drop the whole history
  /session new       save this session and start a new one
  /session remove    delete this session's file and start a new one
  /tokens            show the remaining context budget
  /help              show this help
  /exit              save and quit";

impl Command {
    /// Parse a console line. Returns None when the line is not a command.
    pub fn parse(line: &str) -> Option<Result<Command, CommandError>> {
        let rest = line.trim().strip_prefix('/')?;
        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        let parsed = match (name.as_str(), args.as_slice()) {
            ("switch", [id]) => Ok(Command::Switch((*id).to_string())),
            ("switch", _) => Err(CommandError::Usage("/switch <id>")),
            ("session", [sub]) => match sub.to_ascii_lowercase().as_str() {
                "list" | "ls" => Ok(Command::List),
                "display" | "show" => Ok(Command::Display),
                "pop" => Ok(Command::Pop),
                "clear" => Ok(Command::Clear),
                "new" => Ok(Command::New),
                "remove" | "rm" => Ok(Command::Remove),
                _ => Err(CommandError::Usage(
                    "/session list|display|pop|clear|new|remove",
                )),
            },
            ("session", _) => Err(CommandError::Usage(
                "/session list|display|pop|clear|new|remove",
            )),
            ("tokens", []) => Ok(Command::Tokens),
            ("help" | "?", _) => Ok(Command::Help),
            ("exit" | "quit", _) => Ok(Command::Exit),
            (other, _) => Err(CommandError::Unknown(other.to_string())),
        };
        Some(parsed)
    }
}
