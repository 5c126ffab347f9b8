/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

// src/transport/tls.rs
// TLS material loading for transports.
//
// TlsOptions in the configuration only carry file paths. load_tls reads
// those files into PEM bytes so the transports never touch the
// filesystem themselves, and so certificate problems show up when the
// connections are built rather than on first use.

use std::path::Path;

use rumqttc::TlsConfiguration;

use crate::config::TlsOptions;
use crate::errors::PubSubClientError;

// ClientTlsConfig is loaded TLS material for talking to the broker.
#[derive(Clone, Debug)]
pub struct ClientTlsConfig {
    // ca_certificate is PEM bytes for a CA certificate (or CA
    // certificate bundle) used to verify the broker.
    pub ca_certificate: Vec<u8>,
    // client_identity is an optional client certificate and key for
    // doing mTLS with the broker.
    pub client_identity: Option<ClientTlsIdentity>,
}

// ClientTlsIdentity is a PEM client certificate and its matching
// private key.
#[derive(Clone, Debug)]
pub struct ClientTlsIdentity {
    pub certificate: Vec<u8>,
    pub private_key: Vec<u8>,
}

// load_tls reads every file named in the options. A CA file is
// required; skipping verification is not supported by the MQTT
// transport's TLS stack, so it is rejected instead of silently ignored.
pub fn load_tls(options: &TlsOptions) -> Result<ClientTlsConfig, PubSubClientError> {
    if options.insecure_skip_verify {
        return Err(PubSubClientError::tls_error(
            "insecure_skip_verify is not supported, provide a ca_file instead",
        ));
    }

    let ca_file = options
        .ca_file
        .as_deref()
        .ok_or_else(|| PubSubClientError::tls_error("ca_file is required when tls is enabled"))?;
    let ca_certificate = read_pem(ca_file, "CA certificate")?;

    let client_identity = match (&options.cert_file, &options.key_file) {
        (Some(cert_file), Some(key_file)) => Some(ClientTlsIdentity {
            certificate: read_pem(cert_file, "client certificate")?,
            private_key: read_pem(key_file, "client key")?,
        }),
        (None, None) => None,
        _ => {
            return Err(PubSubClientError::tls_error(
                "cert_file and key_file must be set together",
            ));
        }
    };

    Ok(ClientTlsConfig {
        ca_certificate,
        client_identity,
    })
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>, PubSubClientError> {
    let bytes = std::fs::read(path).map_err(|e| {
        PubSubClientError::tls_error(format!("failed to read {what} {}: {e}", path.display()))
    })?;
    if !bytes.starts_with(b"-----BEGIN") {
        return Err(PubSubClientError::tls_error(format!(
            "{what} {} is not PEM encoded",
            path.display()
        )));
    }
    Ok(bytes)
}

impl From<ClientTlsConfig> for TlsConfiguration {
    fn from(config: ClientTlsConfig) -> Self {
        TlsConfiguration::Simple {
            ca: config.ca_certificate,
            alpn: None,
            client_auth: config
                .client_identity
                .map(|identity| (identity.certificate, identity.private_key)),
        }
    }
}
