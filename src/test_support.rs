use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, OnceLock,
};

use async_trait::async_trait;
use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    pkey::PKey,
    rsa::Rsa,
    x509::{X509NameBuilder, X509},
};
use reqwest::StatusCode;

use crate::{
    app::Auth,
    clock::{Clock, SystemClock},
    credentials::Credentials,
    error::{AuthError, AuthResult},
    json_web::{
        CertificateStore, HttpTransport, IssuerScope, TokenIssuer, TokenVerifier,
        TransportResponse, VerifiedToken,
    },
};

pub const PROJECT_ID: &str = "demo-project";

pub struct TestKey {
    pub private_pem: String,
    pub cert_pem: String,
}

pub fn test_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| generate_key("signer-one"))
}

pub fn other_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| generate_key("signer-two"))
}

/// An RSA key and a self-signed certificate for its public half.
fn generate_key(common_name: &str) -> TestKey {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    TestKey {
        private_pem: String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
        cert_pem: String::from_utf8(builder.build().to_pem().unwrap()).unwrap(),
    }
}

pub fn credentials(key: &TestKey, key_id: &str) -> Credentials {
    Credentials {
        kind: "service_account".into(),
        project_id: PROJECT_ID.into(),
        private_key_id: Some(key_id.into()),
        private_key: key.private_pem.clone(),
        client_email: format!("firebase-adminsdk@{PROJECT_ID}.iam.gserviceaccount.com"),
        client_id: None,
    }
}

/// Serves a canned certificate document and counts how often it was asked.
pub struct FakeTransport {
    response: Mutex<Option<TransportResponse>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn serving(keys: &[(&str, &TestKey)], max_age: Option<u64>) -> Self {
        let transport = Self {
            response: Mutex::new(None),
            calls: AtomicUsize::new(0),
        };
        transport.serve(keys, max_age);
        transport
    }

    pub fn with_body(status: StatusCode, body: serde_json::Value) -> Self {
        Self {
            response: Mutex::new(Some(TransportResponse {
                status,
                cache_control: None,
                body: body.to_string().into_bytes(),
            })),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn serve(&self, keys: &[(&str, &TestKey)], max_age: Option<u64>) {
        let document = keys
            .iter()
            .map(|(kid, key)| (kid.to_string(), serde_json::Value::from(key.cert_pem.clone())))
            .collect::<serde_json::Map<_, _>>();
        *self.response.lock().unwrap() = Some(TransportResponse {
            status: StatusCode::OK,
            cache_control: max_age.map(|age| format!("public, max-age={age}")),
            body: serde_json::Value::Object(document).to_string().into_bytes(),
        });
    }

    /// Every later fetch fails as if the network were down.
    pub fn fail(&self) {
        *self.response.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, _url: &str) -> AuthResult<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AuthError::FetchFailure("connection refused".into()))
    }
}

/// An [`Auth`] whose verifier and issuer share `test_key`, so minted tokens verify.
pub fn auth(transport: Arc<FakeTransport>) -> Arc<Auth> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let certs = Arc::new(CertificateStore::new(
        "https://certs.test/x509",
        transport,
        clock.clone(),
    ));
    let issuer = TokenIssuer::new(
        &credentials(test_key(), "kid-1"),
        IssuerScope::id_token(PROJECT_ID),
        clock.clone(),
    )
    .unwrap();
    Arc::new(Auth::new(TokenVerifier::new(PROJECT_ID, certs, clock), issuer))
}

/// A verified token carrying `roles`, for exercising predicates.
pub fn token_with_roles(roles: Option<&[&str]>) -> VerifiedToken {
    let mut claims = serde_json::json!({
        "iss": "https://securetoken.google.com/demo-project",
        "aud": PROJECT_ID,
        "sub": "user-123",
        "exp": 2_000_000_000u64,
    });
    if let Some(roles) = roles {
        claims["roles"] = serde_json::json!(roles);
    }
    VerifiedToken::new(serde_json::from_value(claims).unwrap(), "kid-1".into())
}
