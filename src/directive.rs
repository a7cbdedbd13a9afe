//! Tag parser (component F): reads the opt-in `-- Stash:` directives the
//! ORM layer embeds as SQL comments (spec.md §4.F / §6.3).

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// Outcome of scanning a command's text for `Stash:` directives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Directive {
    pub is_opt_out: bool,
    pub is_opt_in: bool,
    pub absolute_ttl: Option<Duration>,
    pub sliding_ttl: Option<Duration>,
    pub profile_name: Option<String>,
}

static DIRECTIVE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*--\s*Stash:\s*(.+?)\s*$").expect("static regex is valid"));
static TTL_SLIDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^TTL=(\d+)(?:,Sliding=(\d+))?$").expect("static regex is valid"));
static PROFILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Profile=(.+)$").expect("static regex is valid"));

/// Parse every `-- Stash:` directive line in `sql`. Only one directive is
/// expected per query; if both an opt-in and `NoCache` appear, opt-out
/// wins (spec.md §4.F).
pub fn parse(sql: &str) -> Directive {
    let mut result = Directive::default();

    for cap in DIRECTIVE_LINE_RE.captures_iter(sql) {
        let rhs = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");

        if rhs.eq_ignore_ascii_case("NoCache") {
            result.is_opt_out = true;
            continue;
        }

        if let Some(ttl_cap) = TTL_SLIDING_RE.captures(rhs) {
            result.is_opt_in = true;
            let ttl_secs: u64 = ttl_cap[1].parse().unwrap_or(0);
            if ttl_secs > 0 {
                result.absolute_ttl = Some(Duration::from_secs(ttl_secs));
            }
            if let Some(sliding) = ttl_cap.get(2) {
                if let Ok(s) = sliding.as_str().parse::<u64>() {
                    result.sliding_ttl = Some(Duration::from_secs(s));
                }
            }
            continue;
        }

        if let Some(profile_cap) = PROFILE_RE.captures(rhs) {
            result.is_opt_in = true;
            result.profile_name = Some(profile_cap[1].trim().to_string());
            continue;
        }
    }

    // Opt-out supersedes everything, including an opt-in that may have
    // appeared in another directive line.
    if result.is_opt_out {
        result.is_opt_in = false;
    }

    result
}
