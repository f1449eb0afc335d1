mod certs;
mod claims;
mod issue;
mod transport;
mod verify;

pub use certs::{
    Certificate, CertificateStore, CLIENT_CERT_URL, DEFAULT_CERTS_CACHE_TIME,
    DEFAULT_MAX_STALENESS,
};
pub use claims::{CustomClaims, IdTokenClaims, RESERVED_CLAIMS, ROLES_CLAIM};
pub use issue::{IssuerScope, TokenIssuer, DEFAULT_TOKEN_LIFETIME, FIREBASE_AUDIENCE};
pub use transport::{HttpTransport, ReqwestTransport, TransportResponse};
pub use verify::{
    id_token_issuer, TokenVerifier, VerifiedToken, ACCEPTABLE_EXP_SKEW, MAX_SUBJECT_LENGTH,
};
