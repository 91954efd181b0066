//! `/etc/default/scx` handling.
//!
//! The file is a shell-sourced `KEY=VALUE` list read by the scx service:
//!
//! ```text
//! SCX_SCHEDULER=scx_rusty
//! #SCX_FLAGS='--slice-us 20000'
//! ```
//!
//! It is root-owned, so changes are expressed as a `sed -i` script that runs
//! under the privileged helper rather than written from this process.

use std::path::Path;

const SCHEDULER_KEY: &str = "SCX_SCHEDULER=";
const FLAGS_KEY: &str = "SCX_FLAGS=";
const COMMENTED_FLAGS_KEY: &str = "#SCX_FLAGS=";

/// Whether the flags line is commented out.
pub fn is_flags_commented(content: &str) -> bool {
    content.contains(COMMENTED_FLAGS_KEY)
}

/// sed expression that brings the flags line in line with `flags`.
///
/// | flags     | line commented | result                        |
/// |-----------|----------------|-------------------------------|
/// | empty     | no             | comment the line out          |
/// | non-empty | yes            | set and uncomment             |
/// | non-empty | no             | set                           |
/// | empty     | yes            | nothing to do (`None`)        |
pub fn flags_sed_expr(flags: &str, commented: bool) -> Option<String> {
    match (flags.is_empty(), commented) {
        (true, false) => Some("-e 's/SCX_FLAGS=/#SCX_FLAGS=/'".to_string()),
        (false, true) => Some(format!(r#"-e "s/.*SCX_FLAGS=.*/SCX_FLAGS='{}'/""#, flags)),
        (false, false) => Some(format!(r#"-e "s/SCX_FLAGS=.*/SCX_FLAGS='{}'/""#, flags)),
        (true, true) => None,
    }
}

/// Shell script that rewrites the scheduler (and flags) in `conf_path` and
/// then runs `systemctl <service_cmd> <unit>`.
pub fn apply_script(
    scheduler: &str,
    flags_expr: Option<&str>,
    conf_path: &Path,
    systemctl: &str,
    service_cmd: &str,
    unit: &str,
) -> String {
    let mut sed = format!("sed -e 's/SCX_SCHEDULER=.*/SCX_SCHEDULER={}/'", scheduler);
    if let Some(expr) = flags_expr {
        sed.push(' ');
        sed.push_str(expr);
    }
    format!(
        "{} -i {} && {} {} {}",
        sed,
        conf_path.display(),
        systemctl,
        service_cmd,
        unit
    )
}

/// Values currently configured in `/etc/default/scx`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScxConf {
    pub scheduler: Option<String>,
    /// Flags text; `None` when the line is missing or commented out.
    pub flags: Option<String>,
}

impl ScxConf {
    pub fn parse(content: &str) -> Self {
        let mut conf = ScxConf::default();
        for line in content.lines().map(str::trim) {
            if let Some(value) = line.strip_prefix(SCHEDULER_KEY) {
                conf.scheduler = Some(unquote(value).to_string());
            } else if let Some(value) = line.strip_prefix(FLAGS_KEY) {
                conf.flags = Some(unquote(value).to_string());
            }
        }
        conf
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
