//! Manifest version 3.0.0.
//!
//! Predates pastebins, short URLs, signup domains and per-tenant embed
//! colors. Imported tenants get the default embed color and the pastebin
//! tree is recreated empty.

use serde_json::{Map, Value};

use super::manifest::{
    check_fingerprint, read_audit_logs, read_invites, read_resources, read_users,
    EmbedColorField, ImportPlan, FILES,
};
use super::ValidationReport;
use crate::crypto::MasterKey;
use crate::Result;

pub(super) const VERSION: &str = "3.0.0";

pub(super) fn validate(root: &Map<String, Value>, key: &MasterKey) -> Result<ImportPlan> {
    let mut report = ValidationReport::new();
    check_fingerprint(root, key, &mut report);

    let users = read_users(root, key, EmbedColorField::Absent, &mut report);
    let files = read_resources(root, FILES, &users.known_ids, key, &mut report);
    let audit_logs = read_audit_logs(root, &mut report);
    let invites = read_invites(root, &mut report);

    report.into_result()?;

    Ok(ImportPlan {
        version: VERSION,
        tenants: users.tenants,
        api_tokens: users.api_tokens,
        files,
        audit_logs,
        invites,
        includes_pastebins: false,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;
    use crate::db::DEFAULT_EMBED_COLOR;
    use crate::HoardError;
    use serde_json::json;

    fn key() -> MasterKey {
        MasterKey::from_bytes("current", &[9u8; KEY_LEN]).unwrap()
    }

    fn manifest(key: &MasterKey) -> Map<String, Value> {
        let value = json!({
            "version": VERSION,
            "masterKeyFingerprint": key.fingerprint(),
            "users": [{
                "id": "alice",
                "pathId": "0b7a9a3e-8a4d-4c59-9d4e-3f0f3f1b2c11",
                "createdAt": "2023-05-01T08:00:00Z",
                "disabled": false,
                "storageQuota": 1000,
                "uploadLimit": 0,
                "extensions": ["exe"],
                "extensionMode": "deny",
                "nameStrategy": "random",
                "auditRetentionDays": 30,
                "authSecret": null,
                "backupCodes": []
            }],
            "files": [{
                "id": "a.png",
                "tenantId": "alice",
                "name": "a.png",
                "size": 12,
                "password": null,
                "public": true,
                "views": 3,
                "createdAt": "2023-05-02T08:00:00Z"
            }],
            "pastebins": "ignored in 3.0.0"
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_valid_manifest() {
        let key = key();
        let plan = validate(&manifest(&key), &key).unwrap();

        assert_eq!(plan.version, VERSION);
        assert_eq!(plan.tenants.len(), 1);
        assert_eq!(plan.tenants[0].embed_color, DEFAULT_EMBED_COLOR);
        assert_eq!(plan.files.len(), 1);
        assert!(plan.pastebins.is_empty());
        assert!(!plan.includes_pastebins);
    }

    #[test]
    fn test_embed_color_is_not_read() {
        let key = key();
        let mut root = manifest(&key);
        root["users"][0]["embedColor"] = json!("not a color");

        let plan = validate(&root, &key).unwrap();
        assert_eq!(plan.tenants[0].embed_color, DEFAULT_EMBED_COLOR);
    }

    #[test]
    fn test_unknown_tenant() {
        let key = key();
        let mut root = manifest(&key);
        root["files"][0]["tenantId"] = json!("bob");

        let Err(HoardError::InvalidBackup(report)) = validate(&root, &key) else {
            panic!("expected invalid backup");
        };
        assert_eq!(report.category("files").unwrap()[0].error, "UNKNOWN_TENANT");
        assert_eq!(report.len(), 1);
    }
}
