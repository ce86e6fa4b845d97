//! Registry access through `reg.exe`.
//!
//! Parsing of `reg query` output and `%VAR%` expansion are plain functions;
//! [`Registry`] only adds the command plumbing on top.

use log::{debug, warn};

use crate::error::{ManagerError, Result};
use crate::system::process::CommandRunner;

/// Machine-wide environment variables.
pub const MACHINE_ENVIRONMENT_KEY: &str =
    r"HKLM\SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

/// Key holding the NSSM parameters (`Application`, `InstalledVersion`, ...)
/// of a service.
pub fn service_parameters_key(service: &str) -> String {
    format!(r"HKLM\SYSTEM\CurrentControlSet\Services\{service}\Parameters")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegValueKind {
    Sz,
    ExpandSz,
    MultiSz,
    Dword,
    Other(String),
}

impl RegValueKind {
    fn parse(token: &str) -> Self {
        match token {
            "REG_SZ" => RegValueKind::Sz,
            "REG_EXPAND_SZ" => RegValueKind::ExpandSz,
            "REG_MULTI_SZ" => RegValueKind::MultiSz,
            "REG_DWORD" => RegValueKind::Dword,
            other => RegValueKind::Other(other.to_string()),
        }
    }
}

/// One value line of a `reg query` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegValue {
    pub name: String,
    pub kind: RegValueKind,
    pub data: String,
}

impl RegValue {
    /// Data ready for use: expandable strings are expanded against the
    /// process environment, multi-strings are joined with newlines and
    /// surrounding quotes are dropped.
    pub fn resolved(&self) -> String {
        match self.kind {
            RegValueKind::ExpandSz => expand_env(strip_quotes(&self.data)),
            RegValueKind::MultiSz => self
                .data
                .split("\\0")
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => strip_quotes(&self.data).to_string(),
        }
    }
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches('"')
}

/// Parses the value lines of `reg query <key> [/v <name>]` output.
///
/// Value lines are indented and use runs of four spaces between name, type
/// and data. Key header lines and blank lines are skipped.
pub fn parse_reg_query(output: &str) -> Vec<RegValue> {
    const SEP: &str = "    ";

    output
        .lines()
        .filter(|line| line.starts_with(' '))
        .filter_map(|line| {
            let line = line.trim_start();
            let type_at = line.find(&format!("{SEP}REG_"))?;
            let name = line[..type_at].trim_end().to_string();
            let rest = &line[type_at + SEP.len()..];
            let (kind, data) = match rest.find(SEP) {
                Some(idx) => (&rest[..idx], rest[idx + SEP.len()..].to_string()),
                None => (rest.trim_end(), String::new()),
            };
            Some(RegValue {
                name,
                kind: RegValueKind::parse(kind),
                data,
            })
        })
        .collect()
}

/// Replaces `%NAME%` placeholders using `lookup`. Unknown names and a
/// trailing unmatched `%` are kept verbatim.
pub fn expand_placeholders<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                match (!name.is_empty()).then(|| lookup(name)).flatten() {
                    Some(resolved) => out.push_str(&resolved),
                    None => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// [`expand_placeholders`] against the current process environment.
pub fn expand_env(value: &str) -> String {
    expand_placeholders(value, |name| std::env::var(name).ok())
}

/// Reads and writes registry values with `reg.exe`.
pub struct Registry<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Registry<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Registry { runner }
    }

    /// Single value, `None` when the key or value does not exist.
    pub fn query_value(&self, key: &str, name: &str) -> Option<RegValue> {
        let output = match self.runner.run("reg", &["query", key, "/v", name]) {
            Ok(output) => output,
            Err(e) => {
                warn!("Registry query for {}\\{} failed: {}", key, name, e);
                return None;
            }
        };
        if !output.success() {
            debug!("Registry value {}\\{} not present", key, name);
            return None;
        }
        parse_reg_query(&output.stdout)
            .into_iter()
            .find(|value| value.name.eq_ignore_ascii_case(name))
    }

    /// Every value directly under `key`, `None` when the key is missing.
    pub fn list_values(&self, key: &str) -> Option<Vec<RegValue>> {
        let output = self.runner.run("reg", &["query", key]).ok()?;
        if !output.success() {
            return None;
        }
        Some(parse_reg_query(&output.stdout))
    }

    /// Writes a `REG_SZ` value, creating the key when necessary.
    pub fn set_string(&self, key: &str, name: &str, value: &str) -> Result<()> {
        let output = self.runner.run(
            "reg",
            &["add", key, "/v", name, "/t", "REG_SZ", "/d", value, "/f"],
        )?;
        if output.success() {
            Ok(())
        } else {
            Err(ManagerError::command("reg", output.combined()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_OUTPUT: &str = "\r\nHKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Services\\beszelagent\\Parameters\r\n    Application    REG_EXPAND_SZ    %ProgramFiles%\\beszel-agent\\beszel-agent.exe\r\n    InstalledVersion    REG_SZ    0.17.0\r\n    AppEnvironmentExtra    REG_MULTI_SZ    KEY=abc\\0LISTEN=45876\r\n    AppExit    REG_SZ    \r\n\r\n";

    #[test]
    fn parses_value_lines() {
        let values = parse_reg_query(QUERY_OUTPUT);
        assert_eq!(values.len(), 4);
        assert_eq!(values[0].name, "Application");
        assert_eq!(values[0].kind, RegValueKind::ExpandSz);
        assert_eq!(
            values[0].data,
            "%ProgramFiles%\\beszel-agent\\beszel-agent.exe"
        );
        assert_eq!(values[1].kind, RegValueKind::Sz);
        assert_eq!(values[1].data, "0.17.0");
        assert_eq!(values[3].data, "");
    }

    #[test]
    fn multi_string_is_joined_with_newlines() {
        let values = parse_reg_query(QUERY_OUTPUT);
        assert_eq!(values[2].kind, RegValueKind::MultiSz);
        assert_eq!(values[2].resolved(), "KEY=abc\nLISTEN=45876");
    }

    #[test]
    fn value_names_may_contain_spaces() {
        let values = parse_reg_query("    Display Name    REG_SZ    Beszel Agent\n");
        assert_eq!(values[0].name, "Display Name");
        assert_eq!(values[0].data, "Beszel Agent");
    }

    #[test]
    fn error_output_yields_nothing() {
        assert!(parse_reg_query("ERROR: The system was unable to find the specified registry key or value.").is_empty());
    }

    #[test]
    fn expands_known_placeholders() {
        let expanded = expand_placeholders("%ROOT%\\agent\\%NAME%.exe", |name| match name {
            "ROOT" => Some("C:\\Program Files".to_string()),
            "NAME" => Some("beszel-agent".to_string()),
            _ => None,
        });
        assert_eq!(expanded, "C:\\Program Files\\agent\\beszel-agent.exe");
    }

    #[test]
    fn keeps_unknown_and_unterminated_placeholders() {
        let expanded = expand_placeholders("%MISSING%\\x\\50%", |_| None);
        assert_eq!(expanded, "%MISSING%\\x\\50%");
    }

    #[test]
    fn resolved_strips_quotes_from_plain_strings() {
        let value = RegValue {
            name: "Application".to_string(),
            kind: RegValueKind::Sz,
            data: "\"C:\\agent\\beszel-agent.exe\"".to_string(),
        };
        assert_eq!(value.resolved(), "C:\\agent\\beszel-agent.exe");
    }

    #[test]
    fn parameters_key_contains_service_name() {
        assert_eq!(
            service_parameters_key("beszelagent"),
            r"HKLM\SYSTEM\CurrentControlSet\Services\beszelagent\Parameters"
        );
    }
}
