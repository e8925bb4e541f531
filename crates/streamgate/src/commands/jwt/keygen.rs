//! RSA keypair generation for test tokens

use anyhow::{Context, Result};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::path::Path;

/// RSA key size (2048-bit minimum for RS256)
const RSA_KEY_BITS: usize = 2048;

/// Generate an RSA keypair as PKCS#8 PEM: (private, public)
pub fn generate_pem_pair() -> Result<(String, String)> {
    let mut rng = rand::thread_rng();
    let private_key =
        RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).context("Failed to generate private key")?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("Failed to encode private key to PEM")?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .context("Failed to encode public key to PEM")?;

    Ok((private_pem.to_string(), public_pem))
}

/// Write `private.pem` and `public.pem` into `dir`
pub fn generate_keypair(dir: &Path, force: bool) -> Result<()> {
    println!("WARNING: FOR LOCAL TESTING ONLY - DO NOT USE IN PRODUCTION\n");

    let private_key_path = dir.join("private.pem");
    let public_key_path = dir.join("public.pem");

    if (private_key_path.exists() || public_key_path.exists()) && !force {
        anyhow::bail!(
            "Keypair already exists in {}.\nUse --force to overwrite.",
            dir.display()
        );
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    println!("Generating RSA-{RSA_KEY_BITS} keypair...");
    let (private_pem, public_pem) = generate_pem_pair()?;

    fs::write(&private_key_path, private_pem.as_bytes()).with_context(|| {
        format!(
            "Failed to write private key to {}",
            private_key_path.display()
        )
    })?;
    fs::write(&public_key_path, public_pem.as_bytes()).with_context(|| {
        format!("Failed to write public key to {}", public_key_path.display())
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&private_key_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&private_key_path, perms)?;
    }

    println!("Generated keypair in {}:", dir.display());
    println!("  Private key: {}", private_key_path.display());
    println!("  Public key:  {}", public_key_path.display());
    println!();
    println!("To verify minted tokens, start the server with:");
    println!(
        "  export XSUAA_VERIFICATION_KEY=\"$(cat {})\"",
        public_key_path.display()
    );
    println!("  export XSUAA_URL=\"http://localhost:8080\"");
    println!("  export XSUAA_XSAPPNAME=\"myapp\"");

    Ok(())
}
