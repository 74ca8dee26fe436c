//! User-level service unit for the agent.
//!
//! Unit files are not shell scripts: values are escaped with systemd's own
//! quoting, specifier (`%`) and variable (`$`) rules rather than POSIX quoting.

use crate::domain::error::ProvisionError;
use crate::domain::paths::ProvisionPaths;

/// Backend address used when the caller supplies none.
pub const DEFAULT_BACKEND_ADDR: &str = "localhost:50051";
/// Agent listen port used when the caller supplies none.
pub const DEFAULT_AGENT_PORT: u16 = 50052;

/// Parameters of the agent's startup contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitParams<'a> {
    pub paths: &'a ProvisionPaths,
    pub backend_addr: &'a str,
    pub host_id: &'a str,
    pub agent_port: u16,
}

/// Reject values that would end a unit directive early.
///
/// # Errors
///
/// Returns [`ProvisionError::UnsafeValue`] if `value` contains a control
/// character (newline included).
pub fn validate_unit_value(field: &'static str, value: &str) -> Result<(), ProvisionError> {
    if value.chars().any(char::is_control) {
        return Err(ProvisionError::UnsafeValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Render the service unit.
///
/// Relative install paths are anchored at `%h` (the user's home).
///
/// # Errors
///
/// Returns [`ProvisionError::UnsafeValue`] if any interpolated value contains
/// a control character.
pub fn render_unit(params: &UnitParams<'_>) -> Result<String, ProvisionError> {
    let p = params.paths;
    validate_unit_value("backend address", params.backend_addr)?;
    validate_unit_value("host id", params.host_id)?;
    validate_unit_value("install directory", &p.install_dir)?;

    let exec = [
        anchored_word(&p.binary_path()),
        "--backend".to_string(),
        exec_word("", params.backend_addr),
        "--server-id".to_string(),
        exec_word("", params.host_id),
        "--ca".to_string(),
        anchored_word(&p.ca_path()),
        "--cert".to_string(),
        anchored_word(&p.cert_path()),
        "--key".to_string(),
        anchored_word(&p.key_path()),
        "--port".to_string(),
        params.agent_port.to_string(),
    ]
    .join(" ");

    let workdir = if p.install_dir.starts_with('/') {
        escape_specifiers(&p.install_dir)
    } else {
        format!("%h/{}", escape_specifiers(&p.install_dir))
    };

    Ok(format!(
        "[Unit]\n\
         Description=hostforge agent\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         WorkingDirectory={workdir}\n\
         ExecStart={exec}\n\
         Restart=always\n\
         RestartSec=5\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n"
    ))
}

fn anchored_word(path: &str) -> String {
    if path.starts_with('/') {
        exec_word("", path)
    } else {
        exec_word("%h/", path)
    }
}

/// One `ExecStart=` argument: `prefix` is emitted verbatim, `value` escaped.
fn exec_word(prefix: &str, value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@,+=".contains(c));
    if plain {
        return format!("{prefix}{value}");
    }
    let mut out = format!("\"{prefix}");
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '%' => out.push_str("%%"),
            '$' => out.push_str("$$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Escape specifiers in a plain path setting such as `WorkingDirectory=`.
fn escape_specifiers(value: &str) -> String {
    value.replace('%', "%%")
}
