//! graph-connect - Microsoft Graph connect sample service
//!
//! Signs users in against Azure AD with a certificate-based confidential
//! client and shows their Graph profile.

#![deny(clippy::all)]

mod auth;
mod config;
mod error;
mod graph;
mod server;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use auth::cert_store::CertStore;
use auth::confidential::ConfidentialClient;
use auth::provider::GraphAuthProvider;
use config::Config;
use graph::GraphClient;
use server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        // .env file is optional - only log if it's not a "file not found" error
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize logging
    init_logging();

    info!("Starting graph-connect v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match Config::load() {
        Ok(c) => {
            info!("Configuration loaded successfully");
            c
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Configuration error: {}", e);
            eprintln!("\nPlease set the following environment variables:");
            eprintln!("  AZURE_CLIENT_ID=<your-azure-ad-client-id>");
            eprintln!("  AZURE_TENANT_ID=<your-tenant-id>");
            eprintln!("  AZURE_CERT_THUMBPRINT=<sha1-thumbprint-of-the-app-certificate>");
            std::process::exit(1);
        }
    };

    // Look up the app certificate; startup fails if it is absent.
    let store = CertStore::new(&config.certificates.store_dir);
    let certificate = store
        .find_by_thumbprint(&config.azure_ad.certificate_thumbprint)?
        .ok_or_else(|| {
            error::CertStoreError::NotFound(config.azure_ad.certificate_thumbprint.clone())
        })
        .with_context(|| {
            format!(
                "No usable app certificate in store {}",
                config.certificates.store_dir
            )
        })?;
    info!(
        "Using certificate {} from {}",
        certificate.thumbprint,
        certificate.path.display()
    );

    let private_key = certificate.private_key_pem()?;

    // Construct the confidential client and provider once; request handlers
    // share them for the process lifetime.
    let client = ConfidentialClient::new(&config.azure_ad, &certificate, &private_key)
        .context("Failed to create confidential client")?;
    info!("Confidential client authority: {}", client.authority());

    let provider = Arc::new(GraphAuthProvider::new(
        client,
        config.token.refresh_before_expiry_seconds,
    ));

    let graph_client = Arc::new(
        GraphClient::new(&config.api.graph_base_url).context("Failed to create Graph client")?,
    );

    let state = Arc::new(AppState::new(
        provider,
        graph_client,
        config.azure_ad.callback_path.clone(),
    ));

    server::run(state, &config.server.listen_addr).await
}

/// Initialize tracing/logging.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
