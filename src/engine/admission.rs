//! The admit/deny decision for one licence record, with no I/O.
//!
//! Checks run existence → time → quota → IP. The IP gate comes last because
//! it is the only check that can change state (registering a new IP); a call
//! denied earlier never touches the registry.

use super::ErrorKind;
use crate::models::Licence;

/// Decide whether `caller_ip` may consume one call of `licence` at `now`.
///
/// Returns the state to commit on admission. The input record is never
/// modified, so a denial carries no partial mutation.
pub fn admit(
    licence: &Licence,
    caller_ip: &str,
    hwid: Option<&str>,
    now: i64,
) -> Result<Licence, ErrorKind> {
    if licence.is_expired_at(now) {
        return Err(ErrorKind::Expired);
    }
    if licence.quota_exhausted() {
        return Err(ErrorKind::QuotaExceeded);
    }

    let registered = licence.has_ip(caller_ip);
    if !registered && licence.ips.len() as i64 >= licence.max_ips {
        return Err(ErrorKind::IpNotRegistered);
    }

    let mut next = licence.clone();
    if !registered {
        next.ips.push(caller_ip.to_string());
    }
    next.request_count += 1;
    next.last_used_ip = Some(caller_ip.to_string());
    if let Some(hwid) = hwid {
        if !next.hwid.iter().any(|seen| seen == hwid) {
            next.hwid.push(hwid.to_string());
        }
        next.last_used_hwid = Some(hwid.to_string());
    }
    next.updated_at = now;
    Ok(next)
}
