//! Token decoding and display

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose};
use jsonwebtoken::decode_header;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use streamgate_core::{Identity, TrustAnchor, verify};

use super::format_timestamp;

pub struct DecodeConfig {
    pub token: String,
    pub public_key_path: Option<PathBuf>,
    pub url: Option<String>,
    pub app_id: Option<String>,
}

/// Decode the payload segment without verifying anything
pub fn decode_payload(token: &str) -> Result<Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        anyhow::bail!(
            "Invalid JWT format - expected 3 parts separated by dots, got {} parts",
            parts.len()
        );
    }

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .context("Failed to decode JWT payload")?;
    serde_json::from_slice(&payload_bytes).context("Failed to parse JWT claims")
}

/// Human-readable validity based on `exp` and `nbf` alone
fn time_status(claims: &Value, now: i64) -> String {
    let Some(exp) = claims.get("exp").and_then(Value::as_i64) else {
        return "NO EXPIRY".to_string();
    };
    if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64)
        && now < nbf
    {
        return "NOT YET VALID (nbf not reached)".to_string();
    }
    if exp <= now {
        return "EXPIRED".to_string();
    }

    let remaining = exp - now;
    let hours = remaining / 3600;
    let minutes = (remaining % 3600) / 60;
    if hours > 0 {
        format!("VALID (expires in {hours}h {minutes}m)")
    } else if minutes > 0 {
        format!("VALID (expires in {minutes}m)")
    } else {
        format!("VALID (expires in {remaining}s)")
    }
}

pub fn decode_token(config: &DecodeConfig) -> Result<()> {
    let token = config.token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token);

    let header = decode_header(token).context("Failed to decode JWT header")?;
    println!("Header:");
    println!("  alg: {:?}", header.alg);
    println!("  typ: {}", header.typ.unwrap_or_else(|| "JWT".to_string()));
    if let Some(kid) = header.kid {
        println!("  kid: {kid}");
    }
    println!();

    let claims = decode_payload(token)?;
    println!("Claims:");
    println!(
        "{}",
        serde_json::to_string_pretty(&claims).context("Failed to format claims")?
    );
    println!();

    for name in ["iat", "nbf", "exp"] {
        if let Some(ts) = claims.get(name).and_then(Value::as_i64) {
            println!("  {name}: {}", format_timestamp(ts));
        }
    }
    println!();
    println!("Status: {}", time_status(&claims, chrono::Utc::now().timestamp()));

    let Some(key_path) = &config.public_key_path else {
        return Ok(());
    };
    let (Some(url), Some(app_id)) = (&config.url, &config.app_id) else {
        anyhow::bail!("--url and --app-id are required to verify with --public-key");
    };

    let public_pem = fs::read_to_string(key_path)
        .with_context(|| format!("Failed to read public key from {}", key_path.display()))?;
    let anchor = TrustAnchor::new(url.as_str(), app_id.as_str()).with_verification_key(public_pem);

    match verify(token, &anchor) {
        Ok(claims) => {
            let identity = Identity::from(&claims);
            println!("Verification: OK");
            println!(
                "{}",
                serde_json::to_string_pretty(&identity).context("Failed to format identity")?
            );
        }
        Err(e) => println!("Verification: FAILED ({:?}: {e})", e.kind()),
    }

    Ok(())
}
