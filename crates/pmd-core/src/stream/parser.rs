use pmd_model::{Level, Message};
use tracing::trace;

/// Line-level state machine of the stream protocol.
#[derive(Debug)]
pub struct Parser {
    default: Level,
    open: Option<(Level, String)>,
}

impl Parser {
    pub fn new(default: Level) -> Self {
        Self {
            default,
            open: None,
        }
    }

    /// Feeds one line (without its terminator) and returns a completed message, if any.
    pub fn line(&mut self, line: &str) -> Option<Message> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return None;
        }

        if let Some((level, mut content)) = self.open.take() {
            if line == ":::" {
                return Some(Message::new(level, content));
            }
            content.push('\n');
            content.push_str(line);
            self.open = Some((level, content));
            return None;
        }

        match split_prefix(line) {
            Some((level, true, rest)) => {
                self.open = Some((level, rest.to_string()));
                None
            }
            Some((level, false, rest)) => Some(Message::new(level, rest)),
            None => Some(Message::new(self.default, line)),
        }
    }

    /// Returns `true` while a multi-line message is waiting for its `:::`.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

/// Matches `^(\d+)(:{2,3})(.*)$`; the flag is `true` for `:::`.
///
/// A prefix that does not fit a level is not a prefix: the whole line keeps the default level.
fn split_prefix(line: &str) -> Option<(Level, bool, &str)> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let Ok(level) = line[..digits].parse::<u16>() else {
        trace!(target: "pmd.core.stream", prefix = &line[..digits], "level out of range");
        return None;
    };

    let rest = &line[digits..];
    if let Some(rest) = rest.strip_prefix(":::") {
        Some((Level(level), true, rest))
    } else {
        rest.strip_prefix("::").map(|rest| (Level(level), false, rest))
    }
}
