//! Manifest version 4.0.0, the format written by the exporter.

use serde_json::{Map, Value};

use super::manifest::{
    check_fingerprint, read_audit_logs, read_invites, read_resources, read_short_urls,
    read_signup_domains, read_users, EmbedColorField, ImportPlan, FILES, PASTEBINS,
};
use super::ValidationReport;
use crate::crypto::MasterKey;
use crate::Result;

pub(super) const VERSION: &str = "4.0.0";

pub(super) fn validate(root: &Map<String, Value>, key: &MasterKey) -> Result<ImportPlan> {
    let mut report = ValidationReport::new();
    check_fingerprint(root, key, &mut report);

    let users = read_users(root, key, EmbedColorField::Required, &mut report);
    let files = read_resources(root, FILES, &users.known_ids, key, &mut report);
    let pastebins = read_resources(root, PASTEBINS, &users.known_ids, key, &mut report);
    let short_urls = read_short_urls(root, &users.known_ids, &mut report);
    let audit_logs = read_audit_logs(root, &mut report);
    let invites = read_invites(root, &mut report);
    let signup_domains = read_signup_domains(root, &mut report);

    report.into_result()?;

    Ok(ImportPlan {
        version: VERSION,
        tenants: users.tenants,
        api_tokens: users.api_tokens,
        files,
        pastebins,
        short_urls,
        audit_logs,
        invites,
        signup_domains,
        includes_pastebins: true,
    })
}
