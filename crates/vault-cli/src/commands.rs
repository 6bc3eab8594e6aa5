//! Subcommand implementations.
//!
//! `add` and `clone` shell out to git with an `ext::` remote that routes
//! the transport back through `git-vault run`; `run` is the remote helper
//! proper, serving one request over stdin/stdout.

use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use vault_protocol::GitRequestHandler;
use vault_repo::JsonRevisionLog;
use vault_store::{BlobStore, LocalStore, SecretboxStore};

/// Parsed `<enc-settings>` argument.
enum Encryption {
    None,
    Secretbox([u8; 32]),
}

pub fn add(remote_name: &str, url: &str, encryption: &str) -> Result<()> {
    parse_encryption(encryption)?;
    run_git(&["remote", "add", remote_name, &remote_url(url, encryption)])
}

pub fn clone(url: &str, encryption: &str, destination: Option<&str>) -> Result<()> {
    parse_encryption(encryption)?;
    let remote = remote_url(url, encryption);
    let mut args: Vec<&str> = vec!["clone", &remote];
    if let Some(destination) = destination {
        args.push(destination);
    }
    run_git(&args)
}

pub fn run(url: &str, encryption: &str) -> Result<()> {
    let store = open_store(url, encryption)?;
    let repo = JsonRevisionLog::new(store);

    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    GitRequestHandler::new(stdin, stdout, repo)
        .serve()
        .context("serving git request")?;
    Ok(())
}

fn open_store(url: &str, encryption: &str) -> Result<Box<dyn BlobStore>> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    let store = LocalStore::open(path)
        .with_context(|| format!("opening repository store at {path}"))?;

    Ok(match parse_encryption(encryption)? {
        Encryption::None => Box::new(store),
        Encryption::Secretbox(key) => Box::new(SecretboxStore::new(store, key)),
    })
}

fn parse_encryption(settings: &str) -> Result<Encryption> {
    if settings == "none" {
        return Ok(Encryption::None);
    }
    if let Some(encoded) = settings.strip_prefix("nacl:") {
        let key = STANDARD
            .decode(encoded)
            .context("decoding nacl key from base64")?;
        let key: [u8; 32] = key
            .try_into()
            .map_err(|_| anyhow!("the nacl secret must be 32 bytes in base64"))?;
        return Ok(Encryption::Secretbox(key));
    }
    bail!("invalid encryption settings {settings:?} (expected \"none\" or \"nacl:<base64 key>\")")
}

/// The remote git talks to: `ext::` routes the stream through us.
fn remote_url(url: &str, encryption: &str) -> String {
    format!("ext::git-vault %G run {url} {encryption}")
}

fn run_git(args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .status()
        .context("running git")?;
    if !status.success() {
        bail!("git exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encryption_none() {
        assert!(matches!(parse_encryption("none").unwrap(), Encryption::None));
    }

    #[test]
    fn encryption_nacl_key() {
        let encoded = STANDARD.encode([42u8; 32]);
        let parsed = parse_encryption(&format!("nacl:{encoded}")).unwrap();
        match parsed {
            Encryption::Secretbox(key) => assert_eq!(key, [42u8; 32]),
            Encryption::None => panic!("expected a secretbox key"),
        }
    }

    #[test]
    fn encryption_rejects_wrong_key_length() {
        let encoded = STANDARD.encode([42u8; 16]);
        assert!(parse_encryption(&format!("nacl:{encoded}")).is_err());
    }

    #[test]
    fn encryption_rejects_garbage() {
        assert!(parse_encryption("rot13").is_err());
        assert!(parse_encryption("nacl:!!!").is_err());
    }

    #[test]
    fn remote_url_shape() {
        assert_eq!(
            remote_url("/tmp/repo", "none"),
            "ext::git-vault %G run /tmp/repo none"
        );
    }
}
