use anyhow::{Context, Result};
use reqwest::{Certificate, Identity};
use rustls_pemfile::{certs, private_key};
use std::fs;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// 读取 PEM 格式的 CA 证书，文件中至少要有一张证书
pub fn load_root_certificates(ca_path: &Path) -> Result<Vec<Certificate>> {
    let pem = fs::read(ca_path)
        .with_context(|| format!("Failed to read CA certificate file: {}", ca_path.display()))?;

    let ders = certs(&mut BufReader::new(pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse CA certificate file: {}", ca_path.display()))?;

    if ders.is_empty() {
        anyhow::bail!("No certificates found in CA file: {}", ca_path.display());
    }

    let certificates = ders
        .iter()
        .map(|der| Certificate::from_der(der.as_ref()))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid CA certificate")?;

    info!(
        "Loaded {} CA certificate(s) from {}",
        certificates.len(),
        ca_path.display()
    );
    Ok(certificates)
}

/// 读取客户端证书和私钥，组合成客户端身份
pub fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity> {
    let cert_pem = fs::read(cert_path).with_context(|| {
        format!("Failed to read client certificate file: {}", cert_path.display())
    })?;
    let key_pem = fs::read(key_path)
        .with_context(|| format!("Failed to read client key file: {}", key_path.display()))?;

    let chain = certs(&mut BufReader::new(cert_pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to parse client certificate file")?;
    if chain.is_empty() {
        anyhow::bail!("No certificates found in {}", cert_path.display());
    }

    if private_key(&mut BufReader::new(key_pem.as_slice()))
        .context("Failed to parse client key file")?
        .is_none()
    {
        anyhow::bail!("No private key found in {}", key_path.display());
    }

    let mut pem = key_pem;
    pem.push(b'\n');
    pem.extend_from_slice(&cert_pem);

    let identity = Identity::from_pem(&pem).context("Failed to load client certificate")?;
    info!("Loaded client certificate from {}", cert_path.display());
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_ca_file() {
        assert!(load_root_certificates(Path::new("/nonexistent/ca.pem")).is_err());
    }

    #[test]
    fn test_ca_file_without_certificates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ca.pem");
        fs::write(&path, "just some text\n").unwrap();

        let err = load_root_certificates(&path).unwrap_err();
        assert!(err.to_string().contains("No certificates found"));
    }

    #[test]
    fn test_identity_without_key() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("client.pem");
        let key = dir.path().join("client.key");
        fs::write(&cert, "").unwrap();
        fs::write(&key, "").unwrap();

        assert!(load_identity(&cert, &key).is_err());
    }
}
