//! Token minting for local testing

use anyhow::{Context, Result};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fs;
use std::path::PathBuf;
use streamgate_core::TrustAnchor;
use streamgate_core::auth::SIGNING_ALGORITHM;

use super::format_timestamp;

pub struct MintTokenConfig {
    pub url: String,
    pub app_id: String,
    pub subject: String,
    pub audience: Vec<String>,
    pub scopes: Vec<String>,
    pub client_id: Option<String>,
    pub grant_type: String,
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub expires_in: i64,
    pub claim_strings: Vec<String>,
    pub private_key_path: PathBuf,
}

/// Parse `key=value` claims; numbers and booleans keep their JSON type.
fn parse_custom_claims(claim_strings: &[String]) -> Result<Map<String, Value>> {
    let mut claims = Map::new();

    for claim_str in claim_strings {
        let Some((key, value)) = claim_str.split_once('=') else {
            anyhow::bail!(
                "Invalid claim format '{}'.\nExpected format: key=value",
                claim_str
            );
        };

        let json_value = if let Ok(num) = value.parse::<i64>() {
            Value::Number(num.into())
        } else if let Ok(b) = value.parse::<bool>() {
            Value::Bool(b)
        } else {
            Value::String(value.to_string())
        };

        claims.insert(key.to_string(), json_value);
    }

    Ok(claims)
}

/// Build the token payload issued at `now`.
pub fn build_claims(config: &MintTokenConfig, now: i64) -> Result<Value> {
    let anchor = TrustAnchor::new(config.url.as_str(), config.app_id.as_str());
    let broker_id = anchor.broker_audience();

    let audience = if config.audience.is_empty() {
        vec![broker_id.clone()]
    } else {
        config.audience.clone()
    };
    let client_id = config.client_id.clone().unwrap_or(broker_id);

    let mut claims = parse_custom_claims(&config.claim_strings)?;
    let standard = json!({
        "sub": config.subject,
        "user_id": config.subject,
        "iss": anchor.expected_issuer(),
        "aud": audience,
        "scope": config.scopes,
        "client_id": client_id,
        "azp": client_id,
        "grant_type": config.grant_type,
        "iat": now,
        "exp": now + config.expires_in,
    });
    if let Value::Object(standard) = standard {
        claims.extend(standard);
    }
    if let Some(user_name) = &config.user_name {
        claims.insert("user_name".to_string(), json!(user_name));
    }
    if let Some(email) = &config.email {
        claims.insert("email".to_string(), json!(email));
    }

    Ok(Value::Object(claims))
}

/// Sign `claims` with an RSA private key in PEM form.
pub fn encode_token<T: Serialize>(claims: &T, private_pem: &str) -> Result<String> {
    let encoding_key =
        EncodingKey::from_rsa_pem(private_pem.as_bytes()).context("Failed to parse private key")?;
    encode(&Header::new(SIGNING_ALGORITHM), claims, &encoding_key).context("Failed to encode JWT")
}

pub fn mint_token(config: MintTokenConfig) -> Result<()> {
    eprintln!("WARNING: FOR LOCAL TESTING ONLY - DO NOT USE IN PRODUCTION\n");

    if !config.private_key_path.exists() {
        anyhow::bail!(
            "Private key not found at {}.\nRun 'streamgate jwt generate-keypair' first.",
            config.private_key_path.display()
        );
    }
    let private_pem = fs::read_to_string(&config.private_key_path).with_context(|| {
        format!(
            "Failed to read private key from {}",
            config.private_key_path.display()
        )
    })?;

    let now = chrono::Utc::now().timestamp();
    let claims = build_claims(&config, now)?;
    let token = encode_token(&claims, &private_pem)?;

    println!("{token}");

    eprintln!();
    eprintln!("Claims:");
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&claims).context("Failed to format claims")?
    );
    eprintln!(
        "\nExpires: {}",
        format_timestamp(now + config.expires_in)
    );
    eprintln!("\nUse with:");
    eprintln!("  curl -H \"Authorization: Bearer $TOKEN\" http://localhost:8080/me");

    Ok(())
}
