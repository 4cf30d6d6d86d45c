//! Command/argument splitting and the sorted command dispatch table.
//!
//! Grounded on `Sources/GDBRemote/ProtocolInterpreter.cpp`'s `onPacketData`
//! (the per-leading-byte split rules) and `registerHandler`/`findHandler`
//! (a `Vec` kept sorted by command string, looked up by `lower_bound` plus an
//! equals/starts-with compare). `Session` owns the actual handler bodies
//! (see `session::session`); this module only knows how to recognize which
//! registered command a packet names.

/// Whether a registered command must match a received command exactly, or
/// may match as a prefix of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Full string equality.
    Equals,
    /// The registered command is a prefix of the received one.
    StartsWith,
}

/// One entry of the dispatch table: a command name and how it should match.
#[derive(Debug, Clone, Copy)]
pub struct CommandEntry {
    /// How `command` should be compared against a received command token.
    pub mode: MatchMode,
    /// The registered command string.
    pub command: &'static str,
}

impl CommandEntry {
    fn compare(&self, received: &str) -> std::cmp::Ordering {
        match self.mode {
            MatchMode::Equals => self.command.cmp(received),
            MatchMode::StartsWith => {
                let n = self.command.len().min(received.len());
                self.command.cmp(&received[..n])
            }
        }
    }
}

/// The sorted dispatch table. Built once at `Session` construction from the
/// full list of commands it implements.
pub struct Interpreter {
    entries: Vec<CommandEntry>,
}

impl Interpreter {
    /// Build a table from `entries`, sorting it by command string as
    /// `registerHandler` does.
    pub fn new(mut entries: Vec<CommandEntry>) -> Self {
        entries.sort_by(|a, b| a.command.cmp(b.command));
        Interpreter { entries }
    }

    /// Find the registered command matching `received`, returning the
    /// registered command string (which may be shorter than `received`, for
    /// `StartsWith` entries — e.g. `qRegisterInfo` against `qRegisterInfo1a`).
    pub fn find(&self, received: &str) -> Option<&'static str> {
        let idx = self
            .entries
            .binary_search_by(|e| e.compare(received))
            .ok()?;
        Some(self.entries[idx].command)
    }

    /// Split a raw packet payload into `(command, arguments)` per the
    /// leading-byte rules: `v`/`q`/`Q` commands end at the first
    /// `,`/`:`/`;` (delimiter consumed); `b` and `_` commands are one or two
    /// bytes depending on the following byte; `j` commands end at the first
    /// `:`; everything else is a single-byte command.
    pub fn split_command(data: &str) -> (&str, &str) {
        if data.is_empty() {
            return (data, "");
        }
        let first = data.as_bytes()[0];
        let (command_end, args_start): (usize, Option<usize>) = match first {
            b'v' | b'q' | b'Q' => match data.find([',', ':', ';']) {
                Some(end) => (end, Some(end + 1)),
                None => (data.len(), None),
            },
            b'b' => {
                if data.len() >= 2 && matches!(data.as_bytes()[1], b'c' | b's') {
                    (2, None)
                } else {
                    (1, None)
                }
            }
            b'_' => {
                if data.len() > 1 && matches!(data.as_bytes()[1], b'M' | b'm') {
                    (2, None)
                } else {
                    (1, None)
                }
            }
            b'j' => match data.find(':') {
                Some(end) => (end, Some(end + 1)),
                None => (data.len(), None),
            },
            _ => (1.min(data.len()), None),
        };

        let args_start = args_start.unwrap_or(command_end);
        (&data[..command_end], &data[args_start.min(data.len())..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Interpreter {
        Interpreter::new(vec![
            CommandEntry { mode: MatchMode::Equals, command: "qSupported" },
            CommandEntry { mode: MatchMode::Equals, command: "qXfer" },
            CommandEntry { mode: MatchMode::StartsWith, command: "qRegisterInfo" },
            CommandEntry { mode: MatchMode::Equals, command: "m" },
            CommandEntry { mode: MatchMode::Equals, command: "vCont" },
            CommandEntry { mode: MatchMode::Equals, command: "vCont?" },
        ])
    }

    #[test]
    fn splits_q_class_on_first_delimiter() {
        let (cmd, args) = Interpreter::split_command("qXfer:features:read:target.xml:0,1000");
        assert_eq!(cmd, "qXfer");
        assert_eq!(args, "features:read:target.xml:0,1000");
    }

    #[test]
    fn splits_single_byte_commands() {
        let (cmd, args) = Interpreter::split_command("m4000,4");
        assert_eq!(cmd, "m");
        assert_eq!(args, "4000,4");
    }

    #[test]
    fn vcont_question_mark_has_no_delimiter() {
        let (cmd, args) = Interpreter::split_command("vCont?");
        assert_eq!(cmd, "vCont?");
        assert_eq!(args, "");
    }

    #[test]
    fn b_class_is_two_bytes_only_for_bc_bs() {
        assert_eq!(Interpreter::split_command("bc").0, "bc");
        assert_eq!(Interpreter::split_command("b").0, "b");
    }

    #[test]
    fn underscore_class_is_two_bytes_for_big_and_little_m() {
        assert_eq!(Interpreter::split_command("_M1000,rwx").0, "_M");
        assert_eq!(Interpreter::split_command("_m1000").0, "_m");
    }

    #[test]
    fn finds_exact_and_prefix_matches() {
        let t = table();
        assert_eq!(t.find("qSupported"), Some("qSupported"));
        assert_eq!(t.find("qRegisterInfo"), Some("qRegisterInfo"));
        assert_eq!(t.find("vCont?"), Some("vCont?"));
        assert_eq!(t.find("vCont"), Some("vCont"));
        assert_eq!(t.find("unknown"), None);
    }
}
