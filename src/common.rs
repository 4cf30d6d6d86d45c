//! Wire-level value types shared across the protocol and session layers.

use std::fmt;

/// A process id, thread id, or the wildcards `any`/`all` either one can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// A concrete numeric id.
    Id(u64),
    /// `0`: "any" / "don't care".
    Any,
    /// `-1`: "all".
    All,
}

impl IdKind {
    /// The concrete id, if this isn't a wildcard.
    pub fn id(self) -> Option<u64> {
        match self {
            IdKind::Id(id) => Some(id),
            _ => None,
        }
    }
}

/// A `(pid, tid)` pair as exchanged on the wire. Either half may be absent
/// (no process context given) or a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessThreadId {
    /// Process id, if the dialect in use carries one.
    pub pid: Option<IdKind>,
    /// Thread id.
    pub tid: IdKind,
}

/// The wire dialect a ptid (and other replies) should be formatted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatMode {
    /// Plain GDB: bare hex tid, no process component.
    Gdb,
    /// GDB with `multiprocess+` negotiated: `pPID.TID`.
    GdbMultiprocess,
    /// LLDB: `PID;thread:TID` suffix form.
    Lldb,
}

impl ProcessThreadId {
    /// Parse a ptid in any of the four wire dialects described in
    /// the data model (plain pid, `pXXX.YYY`, `pid;thread:tid`,
    /// `thread:tid`). Rejects hex runs that would overflow a `u64`.
    pub fn parse(s: &str) -> Option<ProcessThreadId> {
        fn parse_component(s: &str) -> Option<IdKind> {
            if s == "-1" {
                return Some(IdKind::All);
            }
            if s.is_empty() {
                return None;
            }
            let neg = s.starts_with('-');
            let digits = if neg { &s[1..] } else { s };
            if digits.len() > 16 {
                return None;
            }
            let v = u64::from_str_radix(digits, 16).ok()?;
            if v == 0 {
                Some(IdKind::Any)
            } else {
                Some(IdKind::Id(v))
            }
        }

        if let Some(rest) = s.strip_prefix('p') {
            let (pid_str, tid_str) = rest.split_once('.')?;
            return Some(ProcessThreadId {
                pid: Some(parse_component(pid_str)?),
                tid: parse_component(tid_str)?,
            });
        }
        if let Some((pid_str, tid_str)) = s.split_once(";thread:") {
            return Some(ProcessThreadId {
                pid: Some(parse_component(pid_str)?),
                tid: parse_component(tid_str)?,
            });
        }
        if let Some(tid_str) = s.strip_prefix("thread:") {
            return Some(ProcessThreadId {
                pid: None,
                tid: parse_component(tid_str)?,
            });
        }
        Some(ProcessThreadId {
            pid: None,
            tid: parse_component(s)?,
        })
    }

    /// Format this ptid back to the wire, in the given dialect.
    pub fn format(self, mode: CompatMode) -> String {
        fn fmt_component(id: IdKind) -> String {
            match id {
                IdKind::Id(v) => format!("{:x}", v),
                IdKind::Any => "0".to_string(),
                IdKind::All => "-1".to_string(),
            }
        }

        match mode {
            CompatMode::Gdb => fmt_component(self.tid),
            CompatMode::GdbMultiprocess => {
                let pid = self.pid.unwrap_or(IdKind::Any);
                format!("p{}.{}", fmt_component(pid), fmt_component(self.tid))
            }
            CompatMode::Lldb => match self.pid {
                Some(pid) => format!("{};thread:{}", fmt_component(pid), fmt_component(self.tid)),
                None => format!("thread:{}", fmt_component(self.tid)),
            },
        }
    }
}

/// A 64-bit address with an explicit validity flag distinguishing "unset"
/// from the value zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    value: u64,
    valid: bool,
}

impl Address {
    /// A valid address.
    pub fn new(value: u64) -> Self {
        Address { value, valid: true }
    }

    /// The "unset" address.
    pub fn invalid() -> Self {
        Address { value: 0, valid: false }
    }

    /// Whether this address carries a real value.
    pub fn is_valid(self) -> bool {
        self.valid
    }

    /// The numeric value. Meaningless if [`is_valid`](Self::is_valid) is false.
    pub fn value(self) -> u64 {
        self.value
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "{:x}", self.value)
        } else {
            write!(f, "<invalid>")
        }
    }
}

/// A single entry of a `qSupported` feature exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    /// Feature name, e.g. `multiprocess`, `swbreak`.
    pub name: String,
    /// How the feature was advertised.
    pub flag: FeatureFlag,
    /// `name=value` payload, if the feature carries one.
    pub value: Option<String>,
}

/// Whether a [`Feature`] is supported, unsupported, or merely queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureFlag {
    /// Suffixed with `+`.
    Supported,
    /// Suffixed with `-`.
    NotSupported,
    /// Suffixed with `?`.
    QuerySupported,
}

impl Feature {
    /// Parse one `;`-separated entry of a `qSupported` packet.
    pub fn parse(entry: &str) -> Option<Feature> {
        if let Some((name, value)) = entry.split_once('=') {
            return Some(Feature {
                name: name.to_string(),
                flag: FeatureFlag::Supported,
                value: Some(value.to_string()),
            });
        }
        let (flag, name) = match entry.chars().last()? {
            '+' => (FeatureFlag::Supported, &entry[..entry.len() - 1]),
            '-' => (FeatureFlag::NotSupported, &entry[..entry.len() - 1]),
            '?' => (FeatureFlag::QuerySupported, &entry[..entry.len() - 1]),
            _ => return None,
        };
        Some(Feature {
            name: name.to_string(),
            flag,
            value: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ptid_round_trips_plain() {
        let p = ProcessThreadId { pid: None, tid: IdKind::Id(0x1a) };
        assert_eq!(ProcessThreadId::parse(&p.format(CompatMode::Gdb)), Some(p));
    }

    #[test]
    fn ptid_round_trips_multiprocess() {
        let p = ProcessThreadId { pid: Some(IdKind::Id(7)), tid: IdKind::Id(0x1a) };
        assert_eq!(
            ProcessThreadId::parse(&p.format(CompatMode::GdbMultiprocess)),
            Some(p)
        );
    }

    #[test]
    fn ptid_round_trips_lldb() {
        let p = ProcessThreadId { pid: Some(IdKind::Id(7)), tid: IdKind::All };
        assert_eq!(ProcessThreadId::parse(&p.format(CompatMode::Lldb)), Some(p));
    }

    #[test]
    fn ptid_rejects_overflow() {
        assert!(ProcessThreadId::parse("p1.ffffffffffffffffff").is_none());
    }

    #[test]
    fn feature_parses_flags_and_values() {
        assert_eq!(
            Feature::parse("multiprocess+"),
            Some(Feature {
                name: "multiprocess".into(),
                flag: FeatureFlag::Supported,
                value: None
            })
        );
        assert_eq!(
            Feature::parse("PacketSize=3fff"),
            Some(Feature {
                name: "PacketSize".into(),
                flag: FeatureFlag::Supported,
                value: Some("3fff".into())
            })
        );
    }
}
