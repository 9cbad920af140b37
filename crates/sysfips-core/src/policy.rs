//! System crypto-policies integration. A host is considered aligned with
//! system FIPS only when alignment is allowed by configuration and the
//! active crypto policy is exactly `FIPS`.

use crate::config::PolicyCfg;
use crate::diagnostics::Diagnostics;
use crate::error::FipsResult;
use crate::resolver::{CapabilityKind, FipsResolver};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

/// File naming the active system-wide crypto policy.
pub const CRYPTO_POLICIES_CONFIG: &str = "/etc/crypto-policies/config";

fn fips_line() -> &'static Regex {
    static FIPS_LINE: OnceLock<Regex> = OnceLock::new();
    FIPS_LINE.get_or_init(|| Regex::new(r"(?mR)^FIPS$").expect("static regex"))
}

/// Active crypto policy as read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CryptoPolicy {
    /// First non-blank, non-comment line, e.g. `DEFAULT` or `FIPS:OSPP`.
    pub name: String,
    /// Whether some line is exactly `FIPS`. `\n`, `\r\n` and a lone `\r`
    /// all end a line.
    pub fips: bool,
}

/// Parse the contents of a crypto-policies config file.
pub fn parse_policy(contents: &str) -> CryptoPolicy {
    let name = contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or_default()
        .to_string();
    CryptoPolicy {
        name,
        fips: fips_line().is_match(contents),
    }
}

/// Read the crypto policy at `path`. A missing file means no policy.
pub fn read_policy(path: &Path, diagnostics: &Diagnostics) -> FipsResult<Option<CryptoPolicy>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            diagnostics.render(
                format_args!("policy: no crypto policy at {}", path.display()),
                "policy: no crypto policy file",
            );
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    let policy = parse_policy(&contents);
    diagnostics.render(
        format_args!("policy: active crypto policy is {}", policy.name),
        "policy: cannot render crypto policy name",
    );
    Ok(Some(policy))
}

/// Combined view of kernel FIPS status and crypto-policy alignment.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentReport {
    pub source: Option<CapabilityKind>,
    pub fips_enabled: bool,
    pub policy: Option<CryptoPolicy>,
    pub alignment_allowed: bool,
    /// Alignment allowed and the crypto policy selects FIPS.
    pub aligned: bool,
    /// Kernel status and crypto policy agree.
    pub consistent: bool,
}

/// Query `resolver` and compare the answer with the system crypto policy.
///
/// Query failures propagate: an unknown kernel status is never reported as
/// disabled.
pub fn evaluate(
    resolver: &FipsResolver,
    config: &PolicyCfg,
    diagnostics: &Diagnostics,
) -> FipsResult<AlignmentReport> {
    let fips_enabled = resolver.query()?;
    let policy = if config.enabled {
        read_policy(&config.path(), diagnostics)?
    } else {
        diagnostics.print("policy: alignment disabled by configuration");
        None
    };

    let policy_fips = policy.as_ref().map(|p| p.fips).unwrap_or(false);
    let aligned = config.enabled && policy_fips;
    let consistent = !config.enabled || policy_fips == fips_enabled;
    if !consistent {
        log::warn!(
            "kernel fips status ({fips_enabled}) disagrees with crypto policy `{}`",
            policy.as_ref().map(|p| p.name.as_str()).unwrap_or("<none>")
        );
    }

    Ok(AlignmentReport {
        source: resolver.capability(),
        fips_enabled,
        policy,
        alignment_allowed: config.enabled,
        aligned,
        consistent,
    })
}
