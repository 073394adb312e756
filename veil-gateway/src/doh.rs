//! DNS-over-HTTPS transport
//!
//! Three operating modes, selected at construction:
//!
//! 1. **Direct**: `POST` the raw wire message to the endpoint with
//!    `Content-Type: application/dns-message` (RFC 8484).
//! 2. **Proxied plaintext**: `POST {proxy}/dns-query` with a bearer token
//!    and a JSON envelope `{data, server}`.
//! 3. **Proxied AEAD**: the JSON envelope is sealed with AES-256-GCM under
//!    a security association shared with the proxy and posted to
//!    `POST {proxy}/sas/{id}/dns-query`.
//!
//! A security association is a random (id, key) pair minted locally and
//! shipped to the proxy wrapped under its certificate's RSA public key
//! (OAEP-SHA256). Certificates are fetched over TLS and cached by serial;
//! trust in them derives from the TLS peer, their key is used only to wrap
//! SA material. A 404 on the AEAD query path means the proxy no longer
//! knows the SA and triggers re-establishment; a 424 on enrolment carries
//! the certificate the proxy wants used.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::header::CONTENT_TYPE;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::Mutex;
use x509_parser::prelude::*;

use crate::crypto;
use crate::error::{Error, Result};

/// Per-attempt HTTPS timeout
pub const DOH_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts per request for recoverable statuses (401, 404, 424) and
/// per-attempt timeouts
pub const RETRY_BUDGET: usize = 10;

/// Security association lifetime; a fresh one is minted on first use
/// after expiry
pub const SA_TTL: Duration = Duration::from_secs(30 * 60);

/// A shared AEAD key plus identifier for the proxied channel
#[derive(Debug, Clone)]
pub struct SecurityAssociation {
    pub id: [u8; 16],
    pub key: [u8; 32],
    created: Instant,
}

impl SecurityAssociation {
    /// Mint a fresh association from the system CSPRNG.
    pub fn fresh() -> Self {
        let mut id = [0u8; 16];
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut id);
        OsRng.fill_bytes(&mut key);
        SecurityAssociation {
            id,
            key,
            created: Instant::now(),
        }
    }

    pub fn expired(&self) -> bool {
        self.created.elapsed() > SA_TTL
    }

    /// The id as it appears in the `/sas/{id}/...` path
    pub fn id_hex(&self) -> String {
        self.id.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[cfg(test)]
    fn aged(age: Duration) -> Self {
        let mut sa = SecurityAssociation::fresh();
        sa.created = Instant::now() - age;
        sa
    }
}

/// A proxy certificate cached by serial
struct ProxyCertificate {
    serial: String,
    public_key: RsaPublicKey,
    last_seen: Instant,
}

fn parse_proxy_certificate(der: &[u8]) -> Result<ProxyCertificate> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::Certificate(format!("invalid DER certificate: {}", e)))?;
    let serial = cert.tbs_certificate.serial.to_str_radix(10);
    let public_key = RsaPublicKey::from_public_key_der(cert.tbs_certificate.subject_pki.raw)
        .map_err(|e| Error::Certificate(format!("unsupported public key: {}", e)))?;
    Ok(ProxyCertificate {
        serial,
        public_key,
        last_seen: Instant::now(),
    })
}

/// OAuth2 client-credentials grant against the proxy's token endpoint
#[derive(Debug, Clone)]
pub struct OAuth2Client {
    pub token_endpoint: String,
    client_id: String,
    client_secret: String,
}

impl OAuth2Client {
    pub fn new(token_endpoint: String, client_id: String, client_secret: String) -> Self {
        OAuth2Client {
            token_endpoint,
            client_id,
            client_secret,
        }
    }

    /// Fetch a fresh bearer token.
    pub async fn fetch_token(&self, http: &reqwest::Client) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Unauthorized);
        }
        Ok(response.json::<TokenResponse>().await?.access_token)
    }
}

/// JSON envelope shipped to the proxy, in the clear or AEAD-sealed
#[derive(Serialize)]
struct QueryEnvelope<'a> {
    /// base64url (no padding) wire message
    data: String,
    /// the DoH endpoint the proxy forwards to
    server: &'a str,
}

/// One RSA-wrapped SA copy, keyed to the certificate that can unwrap it
#[derive(Serialize)]
struct SaEnvelope {
    data: String,
    key_id: String,
}

#[derive(Serialize)]
struct SaEnrolment {
    #[serde(rename = "SAs")]
    sas: Vec<SaEnvelope>,
}

/// The (id, key) pair as wrapped for the proxy
#[derive(Serialize, Deserialize)]
struct SaKeyMaterial {
    id: String,
    key: String,
}

/// Mutable transport state, all behind one mutex
#[derive(Default)]
struct ProxyState {
    token: Option<String>,
    certs: HashMap<String, ProxyCertificate>,
    sa: Option<SecurityAssociation>,
}

/// HTTPS upstream for DNS queries
pub struct DohClient {
    server: String,
    http: reqwest::Client,
    oauth2: Option<OAuth2Client>,
    proxy: Option<String>,
    aead: bool,
    /// Hostnames that must resolve via the classic resolver to avoid
    /// dependency cycles
    passthrough: Vec<String>,
    state: Mutex<ProxyState>,
}

impl DohClient {
    /// Create a client for `server`. With `proxy` set, queries go through
    /// the proxy (bearer-authenticated, requiring `oauth2`); `aead`
    /// additionally wraps them in the SA channel.
    pub fn new(
        server: &str,
        oauth2: Option<OAuth2Client>,
        proxy: Option<String>,
        aead: bool,
    ) -> Result<Self> {
        if proxy.is_some() && oauth2.is_none() {
            return Err(Error::Config(
                "DoH proxy mode requires OAuth2 credentials".into(),
            ));
        }
        if aead && proxy.is_none() {
            return Err(Error::Config("AEAD mode requires a DoH proxy".into()));
        }

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(DOH_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        let mut client = DohClient {
            server: server.to_string(),
            http,
            oauth2,
            proxy,
            aead,
            passthrough: Vec::new(),
            state: Mutex::new(ProxyState::default()),
        };

        let server_url = client.server.clone();
        client.add_passthrough(&server_url)?;
        if let Some(oauth2) = client.oauth2.clone() {
            client.add_passthrough(&oauth2.token_endpoint)?;
        }
        if let Some(proxy) = client.proxy.clone() {
            client.add_passthrough(&proxy)?;
        }

        Ok(client)
    }

    fn add_passthrough(&mut self, url: &str) -> Result<()> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid URL '{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::Config(format!("URL '{}' has no host", url)))?;
        log::info!("passthrough host: {}", host);
        self.passthrough.push(host.to_string());
        Ok(())
    }

    /// True when `host` must be resolved via the classic resolver.
    /// Comparison is literal; wildcard hosts are not supported.
    pub fn is_passthrough(&self, host: &str) -> bool {
        self.passthrough.iter().any(|h| h == host)
    }

    /// Ship one wire DNS message and return the response bytes.
    pub async fn send_query(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.proxy.clone() {
            None => self.direct(data).await,
            Some(proxy) if self.aead => self.proxied_aead(&proxy, data).await,
            Some(proxy) => self.proxied_plain(&proxy, data).await,
        }
    }

    /// RFC 8484 direct mode
    async fn direct(&self, data: &[u8]) -> Result<Vec<u8>> {
        for _ in 0..RETRY_BUDGET {
            let response = match self
                .http
                .post(&self.server)
                .header(CONTENT_TYPE, "application/dns-message")
                .body(data.to_vec())
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    log::debug!("DoH request to {} timed out, retrying", self.server);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.as_u16() == 200 {
                return Ok(response.bytes().await?.to_vec());
            }
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Err(Error::RetriesExhausted(RETRY_BUDGET))
    }

    /// Proxied plaintext mode
    async fn proxied_plain(&self, proxy: &str, data: &[u8]) -> Result<Vec<u8>> {
        let mut refreshed = false;
        for _ in 0..RETRY_BUDGET {
            let token = self.token().await?;
            let envelope = QueryEnvelope {
                data: URL_SAFE_NO_PAD.encode(data),
                server: &self.server,
            };

            let response = match self
                .http
                .post(format!("{}/dns-query", proxy))
                .bearer_auth(&token)
                .json(&envelope)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(e.into()),
            };

            match response.status().as_u16() {
                200 => return Ok(response.bytes().await?.to_vec()),
                401 if !refreshed => {
                    refreshed = true;
                    self.invalidate_token().await;
                }
                401 => return Err(Error::Unauthorized),
                status => {
                    return Err(Error::UpstreamStatus {
                        status,
                        body: response.text().await.unwrap_or_default(),
                    })
                }
            }
        }
        Err(Error::RetriesExhausted(RETRY_BUDGET))
    }

    /// Proxied AEAD mode
    async fn proxied_aead(&self, proxy: &str, data: &[u8]) -> Result<Vec<u8>> {
        let mut refreshed = false;
        for _ in 0..RETRY_BUDGET {
            let (key, sa_id) = self.ensure_sa(proxy).await?;
            let envelope = serde_json::to_vec(&QueryEnvelope {
                data: URL_SAFE_NO_PAD.encode(data),
                server: &self.server,
            })?;
            let sealed = crypto::seal(&key, &envelope)?;

            let response = match self
                .http
                .post(format!("{}/sas/{}/dns-query", proxy, sa_id))
                .header(CONTENT_TYPE, "application/octet-stream")
                .bearer_auth(self.token().await?)
                .body(sealed)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(e.into()),
            };

            match response.status().as_u16() {
                200 => {
                    let body = response.bytes().await?;
                    return crypto::open(&key, &body);
                }
                404 => {
                    log::info!("SA {} unknown to proxy, re-establishing", sa_id);
                    self.reestablish_sa(proxy).await?;
                }
                401 if !refreshed => {
                    refreshed = true;
                    self.invalidate_token().await;
                }
                401 => return Err(Error::Unauthorized),
                status => {
                    return Err(Error::UpstreamStatus {
                        status,
                        body: response.text().await.unwrap_or_default(),
                    })
                }
            }
        }
        Err(Error::RetriesExhausted(RETRY_BUDGET))
    }

    /// Current SA key material, minting and enrolling a fresh association
    /// when none is live.
    async fn ensure_sa(&self, proxy: &str) -> Result<([u8; 32], String)> {
        let mut state = self.state.lock().await;
        if let Some(sa) = &state.sa {
            if !sa.expired() {
                return Ok((sa.key, sa.id_hex()));
            }
        }
        let sa = SecurityAssociation::fresh();
        self.establish_locked(&mut state, proxy, &sa).await?;
        let out = (sa.key, sa.id_hex());
        state.sa = Some(sa);
        Ok(out)
    }

    /// Re-enrol after the proxy reported the SA unknown. The existing
    /// association is kept unless it expired.
    async fn reestablish_sa(&self, proxy: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let sa = match state.sa.take() {
            Some(sa) if !sa.expired() => sa,
            _ => SecurityAssociation::fresh(),
        };
        self.establish_locked(&mut state, proxy, &sa).await?;
        state.sa = Some(sa);
        Ok(())
    }

    /// SA establishment sub-protocol: make sure at least one certificate
    /// is cached, then post one wrapped SA copy per known certificate.
    /// 201 commits (body carries a certificate to add); 424 names a
    /// missing certificate to add before retrying.
    async fn establish_locked(
        &self,
        state: &mut ProxyState,
        proxy: &str,
        sa: &SecurityAssociation,
    ) -> Result<()> {
        if state.certs.is_empty() {
            let cert = self.fetch_certificate(state, proxy).await?;
            log::info!("proxy certificate: serial {}", cert.serial);
            state.certs.insert(cert.serial.clone(), cert);
        }

        let mut refreshed = false;
        for _ in 0..RETRY_BUDGET {
            let sas = state
                .certs
                .values()
                .map(|cert| wrap_sa(cert, sa))
                .collect::<Result<Vec<_>>>()?;
            let token = self.token_locked(state).await?;

            let response = match self
                .http
                .post(format!("{}/sas/", proxy))
                .bearer_auth(&token)
                .json(&SaEnrolment { sas })
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(e.into()),
            };

            let status = response.status().as_u16();
            let body = response.bytes().await?;
            match status {
                201 => {
                    match parse_proxy_certificate(&body) {
                        Ok(cert) => {
                            state.certs.insert(cert.serial.clone(), cert);
                        }
                        Err(e) => log::debug!("ignoring certificate in 201 body: {}", e),
                    }
                    return Ok(());
                }
                424 => {
                    let cert = parse_proxy_certificate(&body)?;
                    log::info!("proxy requires certificate serial {}", cert.serial);
                    state.certs.insert(cert.serial.clone(), cert);
                }
                401 if !refreshed => {
                    refreshed = true;
                    state.token = None;
                }
                401 => return Err(Error::Unauthorized),
                status => {
                    return Err(Error::SaCreation(format!(
                        "enrolment rejected with status {}: {}",
                        status,
                        String::from_utf8_lossy(&body)
                    )))
                }
            }
        }
        Err(Error::RetriesExhausted(RETRY_BUDGET))
    }

    /// `GET /certificate`, bearer-authenticated, body is the proxy's
    /// current DER-encoded X.509 certificate.
    async fn fetch_certificate(
        &self,
        state: &mut ProxyState,
        proxy: &str,
    ) -> Result<ProxyCertificate> {
        let token = self.token_locked(state).await?;
        let response = self
            .http
            .get(format!("{}/certificate", proxy))
            .bearer_auth(&token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Certificate(format!(
                "certificate fetch failed with status {}",
                response.status()
            )));
        }
        parse_proxy_certificate(&response.bytes().await?)
    }

    async fn token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.token_locked(&mut state).await
    }

    async fn token_locked(&self, state: &mut ProxyState) -> Result<String> {
        if let Some(token) = &state.token {
            return Ok(token.clone());
        }
        let oauth2 = self
            .oauth2
            .as_ref()
            .ok_or_else(|| Error::Config("proxy mode requires OAuth2 credentials".into()))?;
        let token = oauth2.fetch_token(&self.http).await?;
        state.token = Some(token.clone());
        Ok(token)
    }

    async fn invalidate_token(&self) {
        self.state.lock().await.token = None;
    }

    /// Age of the most recently fetched proxy certificate, if any.
    pub async fn certificate_age(&self) -> Option<Duration> {
        let state = self.state.lock().await;
        state
            .certs
            .values()
            .map(|cert| cert.last_seen.elapsed())
            .min()
    }
}

/// Encrypt the SA (id, key) pair under one proxy certificate.
fn wrap_sa(cert: &ProxyCertificate, sa: &SecurityAssociation) -> Result<SaEnvelope> {
    let material = serde_json::to_vec(&SaKeyMaterial {
        id: sa.id_hex(),
        key: URL_SAFE_NO_PAD.encode(sa.key),
    })?;
    let wrapped = cert
        .public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &material)
        .map_err(|e| Error::Crypto(format!("RSA-OAEP wrap failed: {}", e)))?;
    Ok(SaEnvelope {
        data: URL_SAFE_NO_PAD.encode(wrapped),
        key_id: cert.serial.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    fn oauth2() -> OAuth2Client {
        OAuth2Client::new(
            "https://auth.example.com/token".into(),
            "client".into(),
            "secret".into(),
        )
    }

    #[test]
    fn test_modes_validated_at_construction() {
        assert!(DohClient::new("https://dns.example.com/", None, None, false).is_ok());
        // proxy without credentials
        assert!(DohClient::new(
            "https://dns.example.com/",
            None,
            Some("https://proxy.example.com".into()),
            false
        )
        .is_err());
        // AEAD without proxy
        assert!(DohClient::new("https://dns.example.com/", Some(oauth2()), None, true).is_err());
    }

    #[test]
    fn test_passthrough_hosts() {
        let client = DohClient::new(
            "https://dns.example.com/dns-query",
            Some(oauth2()),
            Some("https://proxy.example.net:8443/v1".into()),
            true,
        )
        .unwrap();

        assert!(client.is_passthrough("dns.example.com"));
        assert!(client.is_passthrough("auth.example.com"));
        assert!(client.is_passthrough("proxy.example.net"));
        assert!(!client.is_passthrough("example.com"));
        // literal comparison only
        assert!(!client.is_passthrough("sub.dns.example.com"));
    }

    #[test]
    fn test_sa_freshness() {
        let sa = SecurityAssociation::fresh();
        assert!(!sa.expired());
        assert_eq!(sa.id_hex().len(), 32);
        assert!(sa.id_hex().chars().all(|c| c.is_ascii_hexdigit()));

        let stale = SecurityAssociation::aged(SA_TTL + Duration::from_secs(1));
        assert!(stale.expired());
    }

    #[test]
    fn test_distinct_sas() {
        let a = SecurityAssociation::fresh();
        let b = SecurityAssociation::fresh();
        assert_ne!(a.id, b.id);
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_wrap_sa_roundtrip() {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let cert = ProxyCertificate {
            serial: "12345".into(),
            public_key: private.to_public_key(),
            last_seen: Instant::now(),
        };
        let sa = SecurityAssociation::fresh();

        let envelope = wrap_sa(&cert, &sa).unwrap();
        assert_eq!(envelope.key_id, "12345");

        let wrapped = URL_SAFE_NO_PAD.decode(&envelope.data).unwrap();
        let material = private.decrypt(Oaep::new::<Sha256>(), &wrapped).unwrap();
        let parsed: SaKeyMaterial = serde_json::from_slice(&material).unwrap();
        assert_eq!(parsed.id, sa.id_hex());
        assert_eq!(
            URL_SAFE_NO_PAD.decode(&parsed.key).unwrap(),
            sa.key.to_vec()
        );
    }

    #[test]
    fn test_enrolment_envelope_shape() {
        let enrolment = SaEnrolment {
            sas: vec![SaEnvelope {
                data: "AAAA".into(),
                key_id: "7".into(),
            }],
        };
        let json = serde_json::to_value(&enrolment).unwrap();
        assert!(json.get("SAs").is_some());
        assert_eq!(json["SAs"][0]["key_id"], "7");
    }

    #[test]
    fn test_query_envelope_shape() {
        let envelope = QueryEnvelope {
            data: URL_SAFE_NO_PAD.encode(b"\x12\x34"),
            server: "https://dns.example.com/",
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["server"], "https://dns.example.com/");
        assert_eq!(
            URL_SAFE_NO_PAD
                .decode(json["data"].as_str().unwrap())
                .unwrap(),
            b"\x12\x34"
        );
    }

    #[test]
    fn test_garbage_certificate_rejected() {
        assert!(matches!(
            parse_proxy_certificate(&[0u8; 16]),
            Err(Error::Certificate(_))
        ));
    }
}
