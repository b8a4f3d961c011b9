use crate::errors::AmqpError;
use configs::{CertsConfigs, CertsPaths};
use p12_keystore::{Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use std::path::Path;
use tokio::fs;
use tracing::{error, info};
use uuid::Uuid;

const IDENTITY_ALIAS: &str = "client";

/// Transport-security material read back from the configured certificate paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// PEM encoded CA chain used to verify the broker.
    pub ca_chain: String,
    /// Client certificate chain and key, presented during the handshake.
    pub identity: ClientIdentity,
}

/// PKCS#12 bundle of the client key and its certificate chain, the only identity
/// format the AMQP transport accepts.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub der: Vec<u8>,
    pub password: String,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("der", &"<PKCS12>")
            .finish()
    }
}

/// Builds the TLS settings for a connection attempt.
///
/// When all inline sources are present they are first written to their paths, then
/// every file is read back by path and checked to hold usable PEM material.
pub async fn provision(certs: &CertsConfigs) -> Result<TlsSettings, AmqpError> {
    if certs.sources.is_complete() {
        materialize(certs).await?;
    }

    load(&certs.paths).await
}

/// Writes the inline certificate sources to their configured paths.
pub async fn materialize(certs: &CertsConfigs) -> Result<(), AmqpError> {
    if let Some(dir) = Path::new(&certs.paths.ca).parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).await.map_err(|err| {
                error!(error = err.to_string(), "failure to create ssl directory");
                AmqpError::TlsError(err.to_string())
            })?;
        }
    }

    let files = [
        (&certs.paths.ca, &certs.sources.ca),
        (&certs.paths.client_cert, &certs.sources.client_cert),
        (&certs.paths.client_key, &certs.sources.client_key),
    ];

    for (path, data) in files {
        fs::write(path, data).await.map_err(|err| {
            error!(error = err.to_string(), path = %path, "unable to write certificate");
            AmqpError::TlsError(format!("{}: {}", path, err))
        })?;

        info!(path = %path, "certificate created");
    }

    Ok(())
}

/// Reads the CA chain and the client key pair back from disk and bundles the pair
/// into a [`ClientIdentity`].
pub async fn load(paths: &CertsPaths) -> Result<TlsSettings, AmqpError> {
    let ca = read(&paths.ca).await?;
    if parse_certificates(&ca, &paths.ca)?.is_empty() {
        error!(path = %paths.ca, "no certificate found in the CA file");
        return Err(AmqpError::TlsError(format!("{}: no certificate", paths.ca)));
    }

    let ca_chain = String::from_utf8(ca).map_err(|err| {
        error!(error = err.to_string(), path = %paths.ca, "CA file is not valid utf-8");
        AmqpError::TlsError(format!("{}: {}", paths.ca, err))
    })?;

    let client_cert = read(&paths.client_cert).await?;
    let chain = parse_certificates(&client_cert, &paths.client_cert)?;
    if chain.is_empty() {
        error!(path = %paths.client_cert, "no certificate found in the client file");
        return Err(AmqpError::TlsError(format!(
            "{}: no certificate",
            paths.client_cert
        )));
    }

    let client_key = read(&paths.client_key).await?;
    let key = parse_pkcs8_key(&client_key, &paths.client_key)?;

    let identity = bundle(chain, &key, &paths.client_cert)?;

    Ok(TlsSettings { ca_chain, identity })
}

async fn read(path: &str) -> Result<Vec<u8>, AmqpError> {
    fs::read(path).await.map_err(|err| {
        error!(error = err.to_string(), path = path, "error reading certificate");
        AmqpError::TlsError(format!("{}: {}", path, err))
    })
}

fn parse_certificates(pem: &[u8], path: &str) -> Result<Vec<CertificateDer<'static>>, AmqpError> {
    CertificateDer::pem_slice_iter(pem)
        .map(|cert| {
            cert.map_err(|err| {
                error!(error = format!("{:?}", err), path = path, "failed to parse PEM");
                AmqpError::TlsError(format!("{}: {:?}", path, err))
            })
        })
        .collect()
}

/// The transport decodes the bundled key as PKCS#8, other encodings are refused here.
fn parse_pkcs8_key(pem: &[u8], path: &str) -> Result<Vec<u8>, AmqpError> {
    let key = PrivateKeyDer::from_pem_slice(pem).map_err(|err| {
        error!(
            error = format!("{:?}", err),
            path = path,
            "unable to load the client private key"
        );
        AmqpError::TlsError(format!("{}: {:?}", path, err))
    })?;

    match key {
        PrivateKeyDer::Pkcs8(key) => Ok(key.secret_pkcs8_der().to_vec()),
        _ => {
            error!(path = path, "client private key is not PKCS#8 encoded");
            Err(AmqpError::TlsError(format!("{}: key is not PKCS#8", path)))
        }
    }
}

fn bundle(
    chain: Vec<CertificateDer<'static>>,
    key: &[u8],
    path: &str,
) -> Result<ClientIdentity, AmqpError> {
    let failed = |err: p12_keystore::error::Error| {
        error!(error = err.to_string(), path = path, "unable to bundle the client identity");
        AmqpError::TlsError(format!("{}: {}", path, err))
    };

    let chain = chain
        .iter()
        .map(|cert| Certificate::from_der(cert.as_ref()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(failed)?;

    let mut keystore = KeyStore::new();
    keystore.add_entry(
        IDENTITY_ALIAS,
        KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(
            key,
            Uuid::new_v4().as_bytes(),
            chain,
        )),
    );

    let password = Uuid::new_v4().to_string();
    let der = keystore.writer(&password).write().map_err(failed)?;

    Ok(ClientIdentity { der, password })
}

#[cfg(test)]
mod tests {
    use super::*;
    use configs::CertsSources;

    const CERT: &str = include_str!("../testdata/client-cert.pem");
    const KEY: &str = include_str!("../testdata/client-key.pem");
    const SEC1_KEY: &str = include_str!("../testdata/client-key-sec1.pem");

    fn certs_in(dir: &Path, sources: CertsSources) -> CertsConfigs {
        let path = |name: &str| dir.join(name).to_string_lossy().into_owned();

        CertsConfigs {
            sources,
            paths: CertsPaths {
                ca: path("ssl/ca.pem"),
                client_cert: path("ssl/cert.pem"),
                client_key: path("ssl/key.pem"),
            },
        }
    }

    fn complete_sources() -> CertsSources {
        CertsSources {
            ca: CERT.as_bytes().to_vec(),
            client_cert: CERT.as_bytes().to_vec(),
            client_key: KEY.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn should_write_sources_and_read_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let certs = certs_in(dir.path(), complete_sources());

        let settings = provision(&certs).await.unwrap();

        assert_eq!(settings.ca_chain, CERT);
        assert!(dir.path().join("ssl/ca.pem").exists());
        assert!(dir.path().join("ssl/key.pem").exists());
    }

    #[tokio::test]
    async fn should_bundle_the_client_key_pair_into_pkcs12() {
        let dir = tempfile::tempdir().unwrap();
        let certs = certs_in(dir.path(), complete_sources());

        let identity = provision(&certs).await.unwrap().identity;

        let keystore = KeyStore::from_pkcs12(&identity.der, &identity.password).unwrap();
        let (alias, chain) = keystore.private_key_chain().unwrap();
        assert_eq!(alias, IDENTITY_ALIAS);

        let key = PrivateKeyDer::from_pem_slice(KEY.as_bytes()).unwrap();
        assert_eq!(chain.key(), key.secret_der());

        let cert = CertificateDer::from_pem_slice(CERT.as_bytes()).unwrap();
        assert_eq!(chain.chain().len(), 1);
        assert_eq!(chain.chain()[0].as_der(), cert.as_ref());
    }

    #[tokio::test]
    async fn should_read_existing_files_when_sources_are_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let certs = certs_in(dir.path(), complete_sources());
        materialize(&certs).await.unwrap();

        let partial = certs_in(
            dir.path(),
            CertsSources {
                ca: b"ignored".to_vec(),
                ..Default::default()
            },
        );

        let settings = provision(&partial).await.unwrap();
        assert_eq!(settings.ca_chain, CERT);
    }

    #[tokio::test]
    async fn should_fail_when_files_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let certs = certs_in(dir.path(), CertsSources::default());

        let res = provision(&certs).await;
        assert!(matches!(res, Err(AmqpError::TlsError(_))));
    }

    #[tokio::test]
    async fn should_fail_when_ca_has_no_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = complete_sources();
        sources.ca = b"not a pem file".to_vec();
        let certs = certs_in(dir.path(), sources);

        let res = provision(&certs).await;
        assert!(matches!(res, Err(AmqpError::TlsError(_))));
    }

    #[tokio::test]
    async fn should_fail_when_key_is_missing_from_pem() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = complete_sources();
        sources.client_key = CERT.as_bytes().to_vec();
        let certs = certs_in(dir.path(), sources);

        let res = provision(&certs).await;
        assert!(matches!(res, Err(AmqpError::TlsError(_))));
    }

    #[tokio::test]
    async fn should_refuse_a_key_that_is_not_pkcs8() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = complete_sources();
        sources.client_key = SEC1_KEY.as_bytes().to_vec();
        let certs = certs_in(dir.path(), sources);

        let res = provision(&certs).await;
        assert!(matches!(res, Err(AmqpError::TlsError(msg)) if msg.ends_with("key is not PKCS#8")));
    }
}
