// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TLS material for the Vault listener.
//!
//! Each `VaultServer` gets its own self-signed CA and a server certificate
//! signed by it. The CA certificate is shipped in the same secret so the
//! unsealer sidecar and the health monitor can verify the listener.
//!
//! Issuance is behind the [`CertificateIssuer`] trait so reconciliation can be
//! exercised without generating keys.

use crate::constants::{TLS_CA_CERT_KEY, TLS_CA_COMMON_NAME, TLS_SERVER_CERT_KEY, TLS_SERVER_KEY_KEY};
use crate::errors::CertificateError;
use k8s_openapi::ByteString;
use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Identity a server certificate is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsRequest {
    /// `VaultServer` name, which is also the `Service` name
    pub name: String,
    /// `VaultServer` namespace
    pub namespace: String,
}

/// PEM-encoded CA certificate, server certificate and server key.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca_cert_pem: String,
    pub server_cert_pem: String,
    pub server_key_pem: String,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_cert_pem", &self.ca_cert_pem)
            .field("server_cert_pem", &self.server_cert_pem)
            .field("server_key_pem", &"<redacted>")
            .finish()
    }
}

impl TlsMaterial {
    /// Read material from secret data.
    ///
    /// # Errors
    ///
    /// Returns the first required key that is missing or not valid UTF-8.
    pub fn from_secret_data(
        data: Option<&BTreeMap<String, ByteString>>,
    ) -> Result<Self, &'static str> {
        let get = |key: &'static str| -> Result<String, &'static str> {
            data.and_then(|d| d.get(key))
                .and_then(|v| String::from_utf8(v.0.clone()).ok())
                .filter(|v| !v.is_empty())
                .ok_or(key)
        };
        Ok(Self {
            ca_cert_pem: get(TLS_CA_CERT_KEY)?,
            server_cert_pem: get(TLS_SERVER_CERT_KEY)?,
            server_key_pem: get(TLS_SERVER_KEY_KEY)?,
        })
    }

    /// Secret data holding this material.
    #[must_use]
    pub fn to_secret_data(&self) -> BTreeMap<String, ByteString> {
        BTreeMap::from([
            (
                TLS_CA_CERT_KEY.to_string(),
                ByteString(self.ca_cert_pem.clone().into_bytes()),
            ),
            (
                TLS_SERVER_CERT_KEY.to_string(),
                ByteString(self.server_cert_pem.clone().into_bytes()),
            ),
            (
                TLS_SERVER_KEY_KEY.to_string(),
                ByteString(self.server_key_pem.clone().into_bytes()),
            ),
        ])
    }
}

/// Issues TLS material for a Vault server.
pub trait CertificateIssuer: Send + Sync + std::fmt::Debug {
    /// Issue a fresh CA and server certificate for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Generation`] if key generation or signing fails.
    fn issue(&self, request: &TlsRequest) -> Result<TlsMaterial, CertificateError>;
}

/// Subject alternative names on the server certificate.
///
/// Covers per-pod DNS (`<ip-dashed>.<ns>.pod`), the `Service` in its short and
/// qualified forms, and loopback for in-pod clients.
#[must_use]
pub fn server_sans(request: &TlsRequest) -> Vec<String> {
    let TlsRequest { name, namespace } = request;
    vec![
        format!("*.{namespace}.pod"),
        name.clone(),
        format!("{name}.{namespace}.svc"),
        format!("{name}.{namespace}.svc.cluster.local"),
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ]
}

/// Issuer that creates a fresh self-signed CA per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfSignedIssuer;

fn generation_error(what: &'static str) -> impl FnOnce(rcgen::Error) -> CertificateError {
    move |source| CertificateError::Generation { what, source }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn
}

fn san(value: &str) -> Result<SanType, CertificateError> {
    if let Ok(ip) = value.parse::<std::net::IpAddr>() {
        return Ok(SanType::IpAddress(ip));
    }
    Ia5String::try_from(value.to_string())
        .map(SanType::DnsName)
        .map_err(generation_error("subject alternative name"))
}

impl CertificateIssuer for SelfSignedIssuer {
    fn issue(&self, request: &TlsRequest) -> Result<TlsMaterial, CertificateError> {
        debug!(
            name = %request.name,
            namespace = %request.namespace,
            "Issuing self-signed CA and server certificate"
        );

        let mut ca_params = CertificateParams::default();
        ca_params.distinguished_name = distinguished_name(TLS_CA_COMMON_NAME);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_key = KeyPair::generate().map_err(generation_error("CA key"))?;
        let ca_cert = ca_params
            .self_signed(&ca_key)
            .map_err(generation_error("CA certificate"))?;
        let ca_cert_pem = ca_cert.pem();
        let issuer = Issuer::new(ca_params, ca_key);

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(&request.name);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.subject_alt_names = server_sans(request)
            .iter()
            .map(|value| san(value))
            .collect::<Result<Vec<_>, _>>()?;

        let server_key = KeyPair::generate().map_err(generation_error("server key"))?;
        let server_cert = params
            .signed_by(&server_key, &issuer)
            .map_err(generation_error("server certificate"))?;

        Ok(TlsMaterial {
            ca_cert_pem,
            server_cert_pem: server_cert.pem(),
            server_key_pem: server_key.serialize_pem(),
        })
    }
}

#[cfg(test)]
#[path = "pki_tests.rs"]
mod pki_tests;
