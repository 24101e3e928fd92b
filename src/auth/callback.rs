//! Local HTTP listener that receives the OAuth redirect.
//!
//! The listener accepts exactly one meaningful callback: the first request to
//! the redirect path carrying either `code` or `error` resolves the pending
//! authorization, and later requests are answered with `410 Gone`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ArchiveError, Result};

/// What the authorization server sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code {
        code: String,
        state: Option<String>,
    },
    Denied {
        error: String,
        description: Option<String>,
    },
}

type OutcomeSlot = Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>;

/// Router serving the redirect path.
pub fn callback_router(path: &str, slot: OutcomeSlot) -> Router {
    Router::new()
        .route(path, get(handle_callback))
        .with_state(slot)
}

async fn handle_callback(
    State(slot): State<OutcomeSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let outcome = if let Some(code) = params.get("code") {
        CallbackOutcome::Code {
            code: code.clone(),
            state: params.get("state").cloned(),
        }
    } else if let Some(error) = params.get("error") {
        CallbackOutcome::Denied {
            error: error.clone(),
            description: params.get("error_description").cloned(),
        }
    } else {
        return (
            StatusCode::BAD_REQUEST,
            page("Authorization failed", "The callback carried no authorization code."),
        )
            .into_response();
    };

    let sender = slot.lock().ok().and_then(|mut guard| guard.take());
    let Some(sender) = sender else {
        debug!("Ignoring repeated OAuth callback");
        return (
            StatusCode::GONE,
            page("Already handled", "This authorization has already been processed."),
        )
            .into_response();
    };

    let response = match &outcome {
        CallbackOutcome::Code { .. } => (
            StatusCode::OK,
            page(
                "Authorization complete",
                "You can close this window and return to the terminal.",
            ),
        ),
        CallbackOutcome::Denied { error, description } => (
            StatusCode::BAD_REQUEST,
            page(
                "Authorization denied",
                &format!(
                    "{}{}",
                    error,
                    description
                        .as_deref()
                        .map(|d| format!(": {d}"))
                        .unwrap_or_default()
                ),
            ),
        ),
    };

    if sender.send(outcome).is_err() {
        warn!("OAuth callback arrived after the waiter gave up");
    }
    response.into_response()
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{}</p></body></html>",
        escape_html(message)
    ))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A bound, running callback server waiting for one redirect.
pub struct CallbackListener {
    addr: SocketAddr,
    receiver: oneshot::Receiver<CallbackOutcome>,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind the host and port named by `redirect_uri` and start serving its
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Auth`] if the URI has no host or the port
    /// cannot be bound.
    pub async fn bind(redirect_uri: &Url) -> Result<Self> {
        let host = redirect_uri
            .host_str()
            .ok_or_else(|| ArchiveError::Auth(format!("redirect URI has no host: {redirect_uri}")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = redirect_uri.port_or_known_default().unwrap_or(80);

        let listener = tokio::net::TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|e| {
                ArchiveError::Auth(format!("cannot listen for callback on {host}:{port}: {e}"))
            })?;
        let addr = listener
            .local_addr()
            .map_err(|e| ArchiveError::Auth(format!("callback listener has no address: {e}")))?;

        let (sender, receiver) = oneshot::channel();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let router = callback_router(redirect_uri.path(), Arc::new(Mutex::new(Some(sender))));

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "OAuth callback server stopped with error");
            }
        });

        info!(addr = %addr, path = redirect_uri.path(), "Listening for OAuth callback");
        Ok(Self {
            addr,
            receiver,
            shutdown,
            server,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the callback, then stop the server.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Auth`] if nothing arrives within `timeout`.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackOutcome> {
        let Self {
            receiver,
            shutdown,
            mut server,
            ..
        } = self;

        let result = match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(ArchiveError::Auth(
                "callback listener stopped before a redirect arrived".to_string(),
            )),
            Err(_) => Err(ArchiveError::Auth(format!(
                "no authorization received within {}s",
                timeout.as_secs()
            ))),
        };

        let _ = shutdown.send(());
        // Browsers keep connections alive; don't let them hold the process.
        if tokio::time::timeout(Duration::from_secs(1), &mut server)
            .await
            .is_err()
        {
            server.abort();
        }
        result
    }
}
