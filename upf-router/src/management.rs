//! Read/write key-value command surface for operators: table dumps,
//! positional rule CRUD and feature toggles.

use crate::router::UpfRouter;
use crate::rules::{Rule, RuleError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagementError {
    #[error("unknown management key |{0}|")]
    UnknownKey(String),
    #[error("|{0}| is not a valid position")]
    BadPosition(String),
    #[error("|{0}| is not a valid true/false value")]
    BadBool(String),
    #[error(transparent)]
    Rule(#[from] RuleError),
}

impl UpfRouter {
    pub fn handle_read(&self, key: &str) -> Result<String, ManagementError> {
        match key {
            "tunnel-table" => Ok(self.dump_tunnel_table()),
            "rule-table" => Ok(self.dump_rule_table()),
            "stats" => Ok(self.counters().dump()),
            _ => Err(ManagementError::UnknownKey(key.to_string())),
        }
    }

    pub fn handle_write(&mut self, key: &str, value: &str) -> Result<(), ManagementError> {
        match key {
            "rule-insert" => {
                let items = split_rule_items(value);
                let pos = parse_position(items.first().map(String::as_str).unwrap_or(""))?;
                let rule: Rule = items.get(1).map(String::as_str).unwrap_or("").parse()?;
                self.rules_mut().insert_at(rule, pos)?;
                Ok(())
            }
            "rule-append" => {
                // Stop on the first bad item; anything appended before it
                // stays installed.
                for item in split_rule_items(value) {
                    let rule: Rule = item.parse()?;
                    self.rules_mut().append(rule);
                }
                Ok(())
            }
            "rule-delete" => {
                let items = split_rule_items(value);
                let pos = parse_position(items.first().map(String::as_str).unwrap_or(""))?;
                self.rules_mut().delete_at(pos)?;
                Ok(())
            }
            "rule-clear" => {
                self.rules_mut().clear();
                Ok(())
            }
            "set-checksum-mode" => {
                self.set_udp_checksum(parse_bool(value)?);
                Ok(())
            }
            "set-unknown-dump" => {
                self.set_unknown_dump(parse_bool(value)?);
                Ok(())
            }
            _ => Err(ManagementError::UnknownKey(key.to_string())),
        }
    }

    /// One line per binding: `ue,radio_ip,0xTEID,core_ip,0xTEID`.
    fn dump_tunnel_table(&self) -> String {
        let mut bindings = self.tunnel_table().snapshot();
        bindings.sort_by_key(|(ue, _)| *ue);

        let mut out = String::new();
        for (ue, pair) in bindings {
            out.push_str(&format!(
                "{},{},0x{},{},0x{}\n",
                ue, pair.radio.ip, pair.radio.teid, pair.core.ip, pair.core.teid
            ));
        }
        out
    }

    /// One line per rule, with 1-based positions.
    fn dump_rule_table(&self) -> String {
        let mut out = String::new();
        for (i, rule) in self.rules().rules().iter().enumerate() {
            out.push_str(&format!("{},{}\n", i + 1, rule));
        }
        out
    }
}

fn parse_position(item: &str) -> Result<usize, ManagementError> {
    item.trim()
        .parse()
        .map_err(|_| ManagementError::BadPosition(item.to_string()))
}

fn parse_bool(value: &str) -> Result<bool, ManagementError> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ManagementError::BadBool(other.to_string())),
    }
}

/// Split a rule batch into items.  Items are separated by commas or
/// newlines; `//` line comments and `/* */` block comments are skipped and
/// also end the item they interrupt.
pub(crate) fn split_rule_items(text: &str) -> Vec<String> {
    strip_comments(text)
        .split([',', '\n'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '/' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('/') => {
                // Comment to end-of-line; the newline stays as a separator.
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            Some('*') => {
                chars.next();
                let mut prev = ' ';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                // A block comment ends the item it interrupts.
                out.push('\n');
            }
            _ => out.push(c),
        }
    }
    out
}
