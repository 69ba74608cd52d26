//! NFSv4 ACE text protocol
//!
//! The nfs4-acl-tools print and accept one ACE per line in the form
//! `Type:Flags:Principal:Mask`, e.g. `A:fd:alice@example.org:rwaDdxtTnNcy`.
//! Comment lines starting with `#` and blank lines are ignored on read.
//! On write, the whole list is passed as one comma-joined argument.

use crate::acl::role::SYSTEM_PRINCIPALS;
use crate::error::{ToolError, ToolResult};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Regex for one ACE line: type, flags, principal, mask
static ACE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ADUL]):([fdnigSFOI]*):([^:]+):([rwaDdxtTnNcCoy]*)$").expect("Invalid ACE regex")
});

/// Flag: inherited by files created in the directory
pub const FLAG_FILE_INHERIT: char = 'f';
/// Flag: inherited by subdirectories created in the directory
pub const FLAG_DIR_INHERIT: char = 'd';
/// Flag: applies only to children, not the directory itself
pub const FLAG_INHERIT_ONLY: char = 'i';
/// Flag: the principal is a group
pub const FLAG_GROUP: char = 'g';

/// ACE type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AceType {
    Allow,
    Deny,
    Audit,
    Alarm,
}

impl AceType {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(AceType::Allow),
            'D' => Some(AceType::Deny),
            'U' => Some(AceType::Audit),
            'L' => Some(AceType::Alarm),
            _ => None,
        }
    }

    fn as_char(&self) -> char {
        match self {
            AceType::Allow => 'A',
            AceType::Deny => 'D',
            AceType::Audit => 'U',
            AceType::Alarm => 'L',
        }
    }
}

/// A single access-control entry as spoken by the native tooling
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ace {
    pub kind: AceType,
    /// Flag letters, e.g. `fdg`
    pub flags: String,
    /// Principal as printed by the tool: `user@domain`, `group@domain` or `OWNER@`
    pub principal: String,
    /// Permission letters, e.g. `rwaDdxtTnNcy`
    pub mask: String,
}

impl Ace {
    pub fn new(kind: AceType, flags: &str, principal: &str, mask: &str) -> Self {
        Self {
            kind,
            flags: flags.to_string(),
            principal: principal.to_string(),
            mask: mask.to_string(),
        }
    }

    /// Parse one ACE line
    pub fn parse(line: &str) -> ToolResult<Self> {
        let line = line.trim();
        let caps = ACE_REGEX.captures(line).ok_or_else(|| ToolError::MalformedAce {
            line: line.to_string(),
            reason: "expected Type:Flags:Principal:Mask".into(),
        })?;

        let kind = caps
            .get(1)
            .and_then(|m| m.as_str().chars().next())
            .and_then(AceType::from_char)
            .ok_or_else(|| ToolError::MalformedAce {
                line: line.to_string(),
                reason: "unknown ACE type".into(),
            })?;

        Ok(Self {
            kind,
            flags: caps[2].to_string(),
            principal: caps[3].to_string(),
            mask: caps[4].to_string(),
        })
    }

    pub fn is_allow(&self) -> bool {
        self.kind == AceType::Allow
    }

    pub fn is_deny(&self) -> bool {
        self.kind == AceType::Deny
    }

    pub fn is_group(&self) -> bool {
        self.flags.contains(FLAG_GROUP)
    }

    /// OWNER@, GROUP@ or EVERYONE@
    pub fn is_system(&self) -> bool {
        SYSTEM_PRINCIPALS.contains(&self.principal.as_str())
    }

    /// Set both inheritance flags, keeping any other flag letters
    pub fn force_inheritance(&mut self) {
        for flag in [FLAG_FILE_INHERIT, FLAG_DIR_INHERIT] {
            if !self.flags.contains(flag) {
                self.flags.insert(0, flag);
            }
        }
    }
}

impl fmt::Display for Ace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.kind.as_char(),
            self.flags,
            self.principal,
            self.mask
        )
    }
}

/// Parse tool output into ACEs, skipping comments and blank lines
pub fn parse_acl(text: &str) -> ToolResult<Vec<Ace>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(Ace::parse)
        .collect()
}

/// Join ACEs into the single comma-separated argument taken by the setter
pub fn format_acl(aces: &[Ace]) -> String {
    aces.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
