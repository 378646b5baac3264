pub mod api;

use crate::cli::Args;
use crate::orchestrator::PromptOrchestrator;
use api::{ AppState, TlsPaths };
use log::{ error, info };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct Server {
    addr: String,
    orchestrator: Arc<PromptOrchestrator>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, orchestrator: Arc<PromptOrchestrator>, args: Args) -> Self {
        Self {
            addr,
            orchestrator,
            args,
        }
    }

    fn tls_paths(&self) -> Result<Option<TlsPaths>, Box<dyn Error + Send + Sync>> {
        if !self.args.enable_tls {
            info!("TLS not enabled. Running plain HTTP server.");
            return Ok(None);
        }
        match (&self.args.tls_cert_path, &self.args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                Ok(Some(TlsPaths { cert_path: cert_path.clone(), key_path: key_path.clone() }))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                Err("Missing TLS certificate or key path".into())
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                Err("TLS enabled without cert/key".into())
            }
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr: SocketAddr = self.addr
            .parse()
            .map_err(|e| format!("Invalid server address '{}': {}", self.addr, e))?;
        let state = AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            prompts_path: self.args.prompts_path.clone(),
        };
        api::start_http_server(addr, state, self.tls_paths()?).await
    }
}
