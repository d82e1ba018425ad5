//! OID string constants for the parts of a PKCS#10 request that the checks read.
//!
//! Object Identifiers are defined by ITU-T X.660 and referenced by RFC 2986
//! (PKCS#10), RFC 3279 (algorithms), RFC 5480 (ECC) and RFC 8410 (EdDSA).

// ── Public key types ─────────────────────────────────────────────────────

pub const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const DSA: &str = "1.2.840.10040.4.1";
pub const EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
pub const ED25519: &str = "1.3.101.112";
pub const ED448: &str = "1.3.101.113";

// ── Named elliptic curves ────────────────────────────────────────────────

pub const CURVE_P256: &str = "1.2.840.10045.3.1.7";
pub const CURVE_P384: &str = "1.3.132.0.34";
pub const CURVE_P521: &str = "1.3.132.0.35";
pub const CURVE_SECP256K1: &str = "1.3.132.0.10";

// ── Requested extensions ─────────────────────────────────────────────────

pub const EXT_SUBJECT_ALT_NAME: &str = "2.5.29.17";
