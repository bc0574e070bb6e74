//! Access policy for the administrative surface.
//!
//! Every admin operation is listed in one static table together with the
//! capabilities it needs; handlers call [`authorize`] first thing. Roles map
//! to capability sets the same way.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum Capability {
    #[strum(serialize = "licences:read")]
    LicencesRead,
    #[strum(serialize = "licences:write")]
    LicencesWrite,
    #[strum(serialize = "licences:delete")]
    LicencesDelete,
    #[strum(serialize = "audit:read")]
    AuditRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    ListLicences,
    GetLicence,
    CreateLicence,
    UpdateLicence,
    ResetIps,
    DeleteLicence,
    ReadAuditLog,
}

use Capability::*;

const POLICY: &[(Operation, &[Capability])] = &[
    (Operation::ListLicences, &[LicencesRead]),
    (Operation::GetLicence, &[LicencesRead]),
    (Operation::CreateLicence, &[LicencesWrite]),
    (Operation::UpdateLicence, &[LicencesRead, LicencesWrite]),
    (Operation::ResetIps, &[LicencesWrite]),
    (Operation::DeleteLicence, &[LicencesDelete]),
    (Operation::ReadAuditLog, &[AuditRead]),
];

const ROLE_CAPABILITIES: &[(Role, &[Capability])] = &[
    (
        Role::Owner,
        &[LicencesRead, LicencesWrite, LicencesDelete, AuditRead],
    ),
    (Role::Admin, &[LicencesRead, LicencesWrite, AuditRead]),
    (Role::View, &[LicencesRead]),
];

/// Capabilities `operation` requires, or `None` if it is missing from the
/// table (`authorize` denies those).
pub fn required_capabilities(operation: Operation) -> Option<&'static [Capability]> {
    POLICY
        .iter()
        .find(|(op, _)| *op == operation)
        .map(|(_, caps)| *caps)
}

pub fn role_capabilities(role: Role) -> &'static [Capability] {
    ROLE_CAPABILITIES
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, caps)| *caps)
        .unwrap_or(&[])
}

/// Check that `role` may perform `operation`.
pub fn authorize(role: Role, operation: Operation) -> Result<(), AppError> {
    let granted = role_capabilities(role);
    let Some(required) = required_capabilities(operation) else {
        tracing::error!(operation = operation.as_ref(), "Operation missing from policy table");
        return Err(AppError::Forbidden(format!(
            "{} is not permitted",
            operation.as_ref()
        )));
    };

    match required.iter().find(|cap| !granted.contains(*cap)) {
        None => Ok(()),
        Some(missing) => Err(AppError::Forbidden(format!(
            "{} requires {}",
            operation.as_ref(),
            missing.as_ref()
        ))),
    }
}
