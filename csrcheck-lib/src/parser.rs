//! PKCS#10 request parsing from PEM and DER formats.

use crate::fields::{CsrSubject, ParsedCsr, SanEntry};
use crate::key;
use crate::oid;
use crate::util;
use crate::CsrCheckError;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;
use x509_parser::cri_attributes::ParsedCriAttribute;
use x509_parser::prelude::*;

/// Parse a certificate signing request from PEM or DER (auto-detected).
///
/// If the input begins with `-----BEGIN` (after stripping whitespace), it is
/// treated as PEM. Otherwise it is treated as DER.
///
/// Only an unreadable request is an error. A malformed public key or SAN
/// extension is reported inside the returned [`ParsedCsr`] so that the
/// remaining checks can still run.
pub fn parse_csr(input: &[u8]) -> Result<ParsedCsr, CsrCheckError> {
    if input.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CsrCheckError::MalformedCsr("empty input".into()));
    }

    if util::is_pem(input) {
        parse_pem(input)
    } else {
        parse_der(input)
    }
}

/// Parse a certificate signing request from PEM format.
pub fn parse_pem(input: &[u8]) -> Result<ParsedCsr, CsrCheckError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(input)
        .map_err(|e| CsrCheckError::MalformedCsr(format!("invalid PEM: {}", e)))?;

    if pem.label != "CERTIFICATE REQUEST" && pem.label != "NEW CERTIFICATE REQUEST" {
        return Err(CsrCheckError::MalformedCsr(format!(
            "expected CERTIFICATE REQUEST, got {}",
            pem.label
        )));
    }

    parse_der(&pem.contents)
}

/// Parse a certificate signing request from DER format.
pub fn parse_der(input: &[u8]) -> Result<ParsedCsr, CsrCheckError> {
    let (remaining, csr) = X509CertificationRequest::from_der(input)
        .map_err(|e| CsrCheckError::MalformedCsr(format!("invalid PKCS#10 structure: {}", e)))?;

    let csr_len = input.len() - remaining.len();
    let csr_der = input.get(..csr_len).unwrap_or(input);
    build_parsed_csr(&csr, csr_der)
}

fn build_parsed_csr(
    csr: &X509CertificationRequest,
    raw_der: &[u8],
) -> Result<ParsedCsr, CsrCheckError> {
    let info = &csr.certification_request_info;

    // PKCS#10 defines only version 0 (v1).
    if info.version.0 != 0 {
        return Err(CsrCheckError::MalformedCsr(format!(
            "unsupported PKCS#10 version {}",
            info.version.0
        )));
    }

    let subject = build_subject(&info.subject);

    let (key, key_error) = match key::inspect_key(&info.subject_pki) {
        Ok(k) => (Some(k), None),
        Err(e) => {
            debug!(error = %e, "public key could not be inspected");
            (None, Some(e.to_string()))
        }
    };

    let (san, san_error) = match extract_san(csr) {
        Ok(entries) => (entries, None),
        Err(e) => {
            debug!(error = %e, "SAN extension could not be extracted");
            (Vec::new(), Some(e.to_string()))
        }
    };

    Ok(ParsedCsr {
        subject,
        key,
        key_error,
        san,
        san_error,
        raw_der: raw_der.to_vec(),
    })
}

fn build_subject(name: &X509Name) -> CsrSubject {
    fn first<'a, 'b: 'a>(
        mut attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
    ) -> Option<String> {
        attrs.find_map(|a| a.as_str().ok()).map(|s| s.trim().to_string())
    }
    fn all<'a, 'b: 'a>(attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> Vec<String> {
        attrs
            .filter_map(|a| a.as_str().ok())
            .map(|s| s.trim().to_string())
            .collect()
    }

    CsrSubject {
        common_name: first(name.iter_common_name()),
        organization: first(name.iter_organization()),
        organizational_units: all(name.iter_organizational_unit()),
        state: all(name.iter_state_or_province()),
        locality: first(name.iter_locality()),
        country: first(name.iter_country()),
        email_address: first(name.iter_email()),
    }
}

/// Extract the requested Subject Alternative Names of a parsed request.
///
/// DNS names are lowercased; IP addresses are rendered in their canonical
/// textual form. Entries of other kinds (e-mail, URI, ...) are ignored. A
/// request without a SAN extension yields an empty list; a SAN extension that
/// does not decode is an error.
pub fn extract_san(csr: &X509CertificationRequest) -> Result<Vec<SanEntry>, CsrCheckError> {
    let mut entries = Vec::new();

    for attr in csr.certification_request_info.attributes() {
        let ParsedCriAttribute::ExtensionRequest(request) = attr.parsed_attribute() else {
            continue;
        };
        for ext in &request.extensions {
            if ext.oid.to_id_string() != oid::EXT_SUBJECT_ALT_NAME {
                continue;
            }
            match ext.parsed_extension() {
                ParsedExtension::SubjectAlternativeName(san) => {
                    for gn in &san.general_names {
                        if let Some(entry) = general_name_to_san_entry(gn)? {
                            entries.push(entry);
                        }
                    }
                }
                ParsedExtension::ParseError { error } => {
                    return Err(CsrCheckError::MalformedCsr(format!(
                        "invalid Subject Alternative Name extension: {}",
                        error
                    )));
                }
                _ => {
                    return Err(CsrCheckError::MalformedCsr(
                        "Subject Alternative Name extension could not be decoded".into(),
                    ));
                }
            }
        }
    }

    Ok(entries)
}

fn general_name_to_san_entry(gn: &GeneralName) -> Result<Option<SanEntry>, CsrCheckError> {
    match gn {
        GeneralName::DNSName(name) => Ok(Some(SanEntry::Dns(name.trim().to_ascii_lowercase()))),
        GeneralName::IPAddress(bytes) => format_ip_bytes(bytes).map(|ip| Some(SanEntry::Ip(ip))),
        other => {
            debug!(name = ?other, "ignoring unsupported SAN entry kind");
            Ok(None)
        }
    }
}

fn format_ip_bytes(bytes: &[u8]) -> Result<String, CsrCheckError> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        Ok(Ipv4Addr::from(octets).to_string())
    } else if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        Ok(Ipv6Addr::from(octets).to_string())
    } else {
        Err(CsrCheckError::MalformedCsr(format!(
            "IP address SAN entry has invalid length {}",
            bytes.len()
        )))
    }
}
