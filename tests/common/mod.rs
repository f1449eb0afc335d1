#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::{Duration, SystemTime},
};

use firebase_auth::{
    clock::Clock, json_web::id_token_issuer, json_web::IssuerScope, App, AppConfig, Credentials,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    pkey::PKey,
    rsa::Rsa,
    x509::{X509NameBuilder, X509},
};
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate, Times,
};

pub const PROJECT_ID: &str = "demo-project";
pub const KEY_ID: &str = "kid-1";
pub const CERTS_PATH: &str = "/robot/v1/metadata/x509/securetoken";

pub struct Signer {
    pub private_pem: String,
    pub cert_pem: String,
}

impl Signer {
    /// Signs `claims` the way Firebase signs ID tokens.
    pub fn sign(&self, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_owned());
        let key = EncodingKey::from_rsa_pem(self.private_pem.as_bytes()).unwrap();
        encode(&header, claims, &key).unwrap()
    }
}

pub fn signer() -> &'static Signer {
    static SIGNER: OnceLock<Signer> = OnceLock::new();
    SIGNER.get_or_init(|| {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "securetoken.test").unwrap();
        let name = name.build();

        let mut serial = BigNum::new().unwrap();
        serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

        let mut cert = X509::builder().unwrap();
        cert.set_version(2).unwrap();
        cert.set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        cert.set_subject_name(&name).unwrap();
        cert.set_issuer_name(&name).unwrap();
        cert.set_pubkey(&key).unwrap();
        cert.set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        cert.set_not_after(&Asn1Time::days_from_now(7).unwrap())
            .unwrap();
        cert.sign(&key, MessageDigest::sha256()).unwrap();

        Signer {
            private_pem: String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
            cert_pem: String::from_utf8(cert.build().to_pem().unwrap()).unwrap(),
        }
    })
}

pub fn credentials() -> Credentials {
    let document = json!({
        "type": "service_account",
        "project_id": PROJECT_ID,
        "private_key_id": KEY_ID,
        "private_key": signer().private_pem.as_str(),
        "client_email": format!("firebase-adminsdk@{PROJECT_ID}.iam.gserviceaccount.com"),
        "client_id": "1234567890",
    });
    Credentials::from_reader(document.to_string().as_bytes()).unwrap()
}

/// A clock that only moves when told to.
pub struct ManualClock(Mutex<SystemTime>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Mutex::new(SystemTime::now()))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().unwrap()
    }
}

pub fn certificate_document() -> Value {
    let mut document = serde_json::Map::new();
    document.insert(KEY_ID.to_owned(), Value::from(signer().cert_pem.as_str()));
    Value::Object(document)
}

/// Mounts the certificate document, expecting `fetches` downloads.
pub async fn serve_certificates(
    server: &MockServer,
    max_age: u64,
    fetches: impl Into<Times>,
) {
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", format!("public, max-age={max_age}").as_str())
                .set_body_json(certificate_document()),
        )
        .expect(fetches)
        .mount(server)
        .await;
}

/// An app that fetches certificates from `server` and mints ID-token shaped
/// tokens, so whatever it issues it can also verify.
pub fn app(server: &MockServer, clock: Arc<dyn Clock>) -> App {
    App::new(
        AppConfig::new()
            .with_credentials(credentials())
            .with_cert_url(format!("{}{CERTS_PATH}", server.uri()))
            .with_issuer_scope(IssuerScope::id_token(PROJECT_ID))
            .with_clock(clock),
    )
    .unwrap()
}

pub fn id_token_claims(subject: &str, now: u64) -> Value {
    json!({
        "iss": id_token_issuer(PROJECT_ID),
        "aud": PROJECT_ID,
        "sub": subject,
        "iat": now,
        "auth_time": now,
        "exp": now + 3600,
        "email": "user@example.com",
        "email_verified": true,
    })
}
