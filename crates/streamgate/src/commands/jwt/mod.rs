//! JWT utilities for local development
//!
//! Generate an RSA keypair, mint tokens shaped like the ones the
//! authorization server issues, and decode tokens for inspection.

mod decode;
mod keygen;
mod mint;

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Subcommand;
use std::path::PathBuf;

pub use decode::{DecodeConfig, decode_token};
pub use keygen::generate_keypair;
pub use mint::{MintTokenConfig, build_claims, encode_token, mint_token};

/// Format a timestamp as a human-readable UTC string
pub(crate) fn format_timestamp(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "Invalid timestamp".to_string(),
    }
}

/// Default key directory (`<config dir>/streamgate/jwt-test`)
pub(crate) fn default_key_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Failed to get config directory")?;
    Ok(config_dir.join("streamgate").join("jwt-test"))
}

#[derive(Debug, Subcommand)]
pub enum JwtCommand {
    /// Generate an RSA-2048 keypair for signing test tokens
    ///
    /// FOR LOCAL TESTING ONLY
    GenerateKeypair {
        /// Overwrite an existing keypair
        #[arg(long)]
        force: bool,

        /// Directory to write private.pem and public.pem to
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Mint a signed token
    ///
    /// FOR LOCAL TESTING ONLY
    Mint {
        /// Issuer base URL; the token's `iss` is `{url}/oauth/token`
        #[arg(long, env = "XSUAA_URL", default_value = "http://localhost:8080")]
        url: String,

        /// Application id; sets the default audience and client id
        #[arg(long, env = "XSUAA_XSAPPNAME", default_value = "myapp")]
        app_id: String,

        /// Subject claim
        #[arg(long, default_value = "test-user")]
        subject: String,

        /// Audience (repeatable; defaults to `sb-{app_id}`)
        #[arg(long)]
        audience: Vec<String>,

        /// Granted scope (repeatable), e.g. `myapp.read`
        #[arg(long)]
        scope: Vec<String>,

        /// Client id (defaults to `sb-{app_id}`)
        #[arg(long)]
        client_id: Option<String>,

        #[arg(long, default_value = "client_credentials")]
        grant_type: String,

        #[arg(long)]
        user_name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Lifetime in seconds
        #[arg(long, default_value = "3600")]
        expires_in: i64,

        /// Extra claim as key=value (repeatable)
        #[arg(long)]
        claim: Vec<String>,

        /// Private key (defaults to the generate-keypair location)
        #[arg(long)]
        private_key: Option<PathBuf>,
    },

    /// Decode a token and optionally verify it
    Decode {
        token: String,

        /// Verify against this public key
        #[arg(long)]
        public_key: Option<PathBuf>,

        /// Issuer base URL used for verification
        #[arg(long, env = "XSUAA_URL")]
        url: Option<String>,

        /// Application id used for verification
        #[arg(long, env = "XSUAA_XSAPPNAME")]
        app_id: Option<String>,
    },
}

pub fn handle_jwt_command(command: JwtCommand) -> Result<()> {
    match command {
        JwtCommand::GenerateKeypair { force, dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => default_key_dir()?,
            };
            generate_keypair(&dir, force)
        }

        JwtCommand::Mint {
            url,
            app_id,
            subject,
            audience,
            scope,
            client_id,
            grant_type,
            user_name,
            email,
            expires_in,
            claim,
            private_key,
        } => {
            let private_key_path = match private_key {
                Some(path) => path,
                None => default_key_dir()?.join("private.pem"),
            };
            mint_token(MintTokenConfig {
                url,
                app_id,
                subject,
                audience,
                scopes: scope,
                client_id,
                grant_type,
                user_name,
                email,
                expires_in,
                claim_strings: claim,
                private_key_path,
            })
        }

        JwtCommand::Decode {
            token,
            public_key,
            url,
            app_id,
        } => decode_token(&DecodeConfig {
            token,
            public_key_path: public_key,
            url,
            app_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }
}
