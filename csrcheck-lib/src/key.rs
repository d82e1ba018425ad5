//! Public key inspection: algorithm, exact size and RSA parameters.

use crate::fields::{KeyAlgorithm, KeyInfo};
use crate::oid;
use crate::util;
use crate::CsrCheckError;
use x509_parser::prelude::*;

/// Inspect the SubjectPublicKeyInfo of a request.
///
/// RSA keys report the exact bit length of the modulus. EC keys report the
/// size of the named curve, or the size derived from the encoded point when
/// the curve is unknown. Key material that does not decode is `MalformedKey`.
pub fn inspect_key(spki: &SubjectPublicKeyInfo) -> Result<KeyInfo, CsrCheckError> {
    let oid_str = spki.algorithm.algorithm.to_id_string();
    let data: &[u8] = &spki.subject_public_key.data;

    match oid_str.as_str() {
        oid::RSA_ENCRYPTION => {
            let (modulus, exponent) = extract_rsa_params(data).ok_or_else(|| {
                CsrCheckError::MalformedKey("RSA key is not a valid RSAPublicKey structure".into())
            })?;
            let bit_length = util::bit_length(&modulus);
            if bit_length == 0 {
                return Err(CsrCheckError::MalformedKey("RSA modulus is zero".into()));
            }
            Ok(KeyInfo {
                algorithm: KeyAlgorithm::Rsa,
                bit_length,
                curve: None,
                modulus: Some(modulus),
                exponent: Some(exponent),
            })
        }
        oid::EC_PUBLIC_KEY => {
            if data.is_empty() {
                return Err(CsrCheckError::MalformedKey("empty EC point".into()));
            }
            let curve = extract_ec_curve(&spki.algorithm);
            let bit_length = match curve.as_str() {
                "P-256" | "secp256k1" => 256,
                "P-384" => 384,
                "P-521" => 521,
                _ => ec_point_bits(data)?,
            };
            Ok(KeyInfo {
                algorithm: KeyAlgorithm::Ec,
                bit_length,
                curve: Some(curve),
                modulus: None,
                exponent: None,
            })
        }
        oid::ED25519 => fixed_size_key(KeyAlgorithm::Ed25519, data, 32, 256),
        oid::ED448 => fixed_size_key(KeyAlgorithm::Ed448, data, 57, 448),
        oid::DSA => {
            let y = extract_der_integer(data).ok_or_else(|| {
                CsrCheckError::MalformedKey("DSA public value is not a DER INTEGER".into())
            })?;
            Ok(KeyInfo {
                algorithm: KeyAlgorithm::Dsa,
                bit_length: util::bit_length(&y),
                curve: None,
                modulus: None,
                exponent: None,
            })
        }
        other => {
            if data.is_empty() {
                return Err(CsrCheckError::MalformedKey(format!(
                    "empty key material for algorithm {}",
                    other
                )));
            }
            Ok(KeyInfo {
                algorithm: KeyAlgorithm::Other(other.to_string()),
                bit_length: (data.len() as u32).saturating_mul(8),
                curve: None,
                modulus: None,
                exponent: None,
            })
        }
    }
}

fn fixed_size_key(
    algorithm: KeyAlgorithm,
    data: &[u8],
    expected_len: usize,
    bits: u32,
) -> Result<KeyInfo, CsrCheckError> {
    if data.len() != expected_len {
        return Err(CsrCheckError::MalformedKey(format!(
            "{} key must be {} bytes, got {}",
            algorithm,
            expected_len,
            data.len()
        )));
    }
    Ok(KeyInfo {
        algorithm,
        bit_length: bits,
        curve: None,
        modulus: None,
        exponent: None,
    })
}

/// Extract the RSA modulus (leading zeros stripped) and public exponent.
///
/// Returns `None` if the DER structure cannot be parsed.
fn extract_rsa_params(data: &[u8]) -> Option<(Vec<u8>, u64)> {
    let (_, parsed) = x509_parser::der_parser::parse_der(data).ok()?;
    let seq = parsed.as_sequence().ok()?;
    let modulus = seq.first().and_then(|m| m.as_slice().ok())?;
    let exponent = seq.get(1).and_then(|e| e.as_u64().ok())?;
    Some((util::strip_leading_zeros(modulus).to_vec(), exponent))
}

fn extract_der_integer(data: &[u8]) -> Option<Vec<u8>> {
    let (_, parsed) = x509_parser::der_parser::parse_der(data).ok()?;
    let bytes = parsed.as_slice().ok()?;
    Some(util::strip_leading_zeros(bytes).to_vec())
}

/// Field size of an EC point: uncompressed `04||X||Y` or compressed `02/03||X`.
fn ec_point_bits(point: &[u8]) -> Result<u32, CsrCheckError> {
    let coord_len = match point.first() {
        Some(0x04) if point.len() > 1 && (point.len() - 1) % 2 == 0 => (point.len() - 1) / 2,
        Some(0x02) | Some(0x03) if point.len() > 1 => point.len() - 1,
        _ => {
            return Err(CsrCheckError::MalformedKey(
                "EC point has an unrecognized encoding".into(),
            ))
        }
    };
    Ok((coord_len as u32).saturating_mul(8))
}

fn extract_ec_curve(algo: &AlgorithmIdentifier) -> String {
    if let Some(params) = &algo.parameters {
        if let Ok(oid) = params.as_oid() {
            return match oid.to_id_string().as_str() {
                oid::CURVE_P256 => "P-256".into(),
                oid::CURVE_P384 => "P-384".into(),
                oid::CURVE_P521 => "P-521".into(),
                oid::CURVE_SECP256K1 => "secp256k1".into(),
                other => other.to_string(),
            };
        }
    }
    "unknown".into()
}
