//! Test fixtures and constants.

/// User schema with `creditCardNumber` tagged PII.
pub const USER_SCHEMA: &str = r#"{
    "type": "record",
    "name": "User",
    "namespace": "com.example",
    "fields": [
        {"name": "name", "type": "string"},
        {"name": "favoriteNumber", "type": "long"},
        {"name": "favoriteColor", "type": "string"},
        {"name": "creditCardNumber", "type": "string", "confluent:tags": ["PII"]}
    ]
}"#;

/// The same schema without field annotations.
pub const UNTAGGED_USER_SCHEMA: &str = r#"{
    "type": "record",
    "name": "User",
    "namespace": "com.example",
    "fields": [
        {"name": "name", "type": "string"},
        {"name": "favoriteNumber", "type": "long"},
        {"name": "favoriteColor", "type": "string"},
        {"name": "creditCardNumber", "type": "string"}
    ]
}"#;

/// Rule set encrypting PII fields with the local KMS.
pub const ENCRYPT_PII_RULES: &str = r#"{
    "domainRules": [
        {
            "name": "encryptPII",
            "kind": "TRANSFORM",
            "mode": "WRITEREAD",
            "type": "ENCRYPT",
            "tags": ["PII"],
            "params": {
                "encrypt.kek.name": "kek1",
                "encrypt.kms.type": "local-kms",
                "encrypt.kms.key.id": "mykey"
            },
            "onFailure": "ERROR,NONE"
        }
    ]
}"#;

/// The card number used in the end-to-end scenarios.
pub const CARD_NUMBER: &str = "4111-1111-1111-1111";

/// A user record as JSON.
pub fn user_json(name: &str, card: &str) -> String {
    format!(
        r#"{{"name": "{}", "favoriteNumber": 42, "favoriteColor": "blue", "creditCardNumber": "{}"}}"#,
        name, card
    )
}
