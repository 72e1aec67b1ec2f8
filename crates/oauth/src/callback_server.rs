//! One-shot local HTTP listener for the OAuth redirect.
//!
//! The first request to the callback path claims the login: the handler
//! exchanges the code, saves the token, answers the browser and then cancels
//! the listener so the port is released. Requests to other paths get axum's
//! default 404.

use std::{
    collections::HashMap,
    net::SocketAddr,
    pin::pin,
    sync::Arc,
    time::Duration,
};

use {
    axum::{
        Router,
        extract::{Query, State},
        http::StatusCode,
        routing::get,
    },
    tokio::{
        net::TcpListener,
        sync::{Mutex, oneshot},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::Error,
    flow::TokenExchanger,
    storage::TokenStore,
    types::TokenRecord,
};

pub type Outcome = Result<TokenRecord, Error>;

const SUCCESS_BODY: &str = "Authentication Successful! You may close this tab.";
const CODE_MISSING_BODY: &str = "Authorization code not found";
const EXCHANGE_FAILED_BODY: &str =
    "Authentication failed: the authorization code could not be exchanged. See the terminal for details.";
const SAVE_FAILED_BODY: &str =
    "Authentication succeeded, but the token could not be saved. See the terminal for details.";
const ALREADY_HANDLED_BODY: &str = "This login was already handled. You may close this tab.";

/// Everything the callback handler needs, fixed when the listener is built.
struct CallbackState {
    profile: String,
    store: TokenStore,
    exchanger: Arc<dyn TokenExchanger>,
    outcome: Mutex<Option<oneshot::Sender<Outcome>>>,
    /// Fired once a request has taken the outcome sender.
    claimed: CancellationToken,
    shutdown: CancellationToken,
}

/// A bound callback listener waiting to be served.
pub struct CallbackServer {
    listener: TcpListener,
    router: Router,
    outcome: oneshot::Receiver<Outcome>,
    claimed: CancellationToken,
    shutdown: CancellationToken,
}

impl CallbackServer {
    /// Bind the listener. Nothing is served until [`CallbackServer::wait`].
    ///
    /// Cancelling `shutdown` from outside stops the listener; the wait then
    /// ends with [`Error::Cancelled`] unless a callback was already handled.
    pub async fn bind(
        addr: SocketAddr,
        path: &str,
        profile: &str,
        store: TokenStore,
        exchanger: Arc<dyn TokenExchanger>,
        shutdown: CancellationToken,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::ListenerStart { addr, source })?;

        let (tx, rx) = oneshot::channel();
        let claimed = CancellationToken::new();
        let state = Arc::new(CallbackState {
            profile: profile.to_string(),
            store,
            exchanger,
            outcome: Mutex::new(Some(tx)),
            claimed: claimed.clone(),
            shutdown: shutdown.clone(),
        });
        let router = Router::new()
            .route(path, get(handle_callback))
            .with_state(state);

        Ok(Self {
            listener,
            router,
            outcome: rx,
            claimed,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener.local_addr().map_err(Error::ListenerServe)
    }

    /// Serve until the callback has been handled, then return its outcome.
    ///
    /// `timeout` bounds the wait for the redirect only. Once a callback has
    /// been claimed its exchange and save run to completion. Without a
    /// timeout this waits for as long as the user takes.
    pub async fn wait(self, timeout: Option<Duration>) -> Outcome {
        let Self {
            listener,
            router,
            mut outcome,
            claimed,
            shutdown,
        } = self;

        let mut serve = pin!(
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .into_future()
        );

        let mut timed_out = None;
        let served = match timeout {
            None => serve.await,
            Some(limit) => tokio::select! {
                served = &mut serve => served,
                () = claimed.cancelled() => serve.await,
                () = tokio::time::sleep(limit) => {
                    timed_out = Some(limit);
                    shutdown.cancel();
                    // A callback that slipped in before the cancel still finishes.
                    serve.await
                },
            },
        };
        served.map_err(Error::ListenerServe)?;
        debug!("callback listener stopped");

        match timed_out {
            Some(limit) => outcome
                .try_recv()
                .unwrap_or(Err(Error::AuthorizationTimedOut(limit))),
            // Sender dropped unused: the listener was cancelled from outside.
            None => outcome.await.unwrap_or(Err(Error::Cancelled)),
        }
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let Some(sender) = state.outcome.lock().await.take() else {
        debug!("ignoring callback, login already handled");
        return (StatusCode::CONFLICT, ALREADY_HANDLED_BODY);
    };
    state.claimed.cancel();

    let outcome = complete_login(&state, &params).await;
    let response = match &outcome {
        Ok(_) => (StatusCode::OK, SUCCESS_BODY),
        Err(Error::AuthorizationCodeMissing) => (StatusCode::BAD_REQUEST, CODE_MISSING_BODY),
        Err(e) if e.is_storage() => (StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED_BODY),
        Err(_) => (StatusCode::BAD_GATEWAY, EXCHANGE_FAILED_BODY),
    };
    if let Err(e) = &outcome {
        warn!(profile = %state.profile, error = %e, "login failed");
    }

    // The receiver is gone only if the waiting side was dropped.
    let _ = sender.send(outcome);
    state.shutdown.cancel();
    response
}

/// Exchange the code and persist the token. The `state` query parameter is
/// not checked against the one that was sent.
async fn complete_login(state: &CallbackState, params: &HashMap<String, String>) -> Outcome {
    if let Some(error) = params.get("error") {
        warn!(
            error = %error,
            description = params.get("error_description").map(String::as_str).unwrap_or(""),
            "provider returned an error on the redirect"
        );
    }

    let code = params
        .get("code")
        .map(String::as_str)
        .filter(|c| !c.is_empty())
        .ok_or(Error::AuthorizationCodeMissing)?;

    info!(profile = %state.profile, "authorization code received");
    let record = state.exchanger.exchange(code).await?;
    state.store.save_token(&state.profile, &record)?;
    info!(profile = %state.profile, "authentication complete");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        chrono::{TimeZone, Utc},
        std::{
            net::Ipv4Addr,
            sync::atomic::{AtomicUsize, Ordering},
        },
    };

    /// Returns a fixed record and counts calls.
    struct FixedExchanger {
        calls: AtomicUsize,
        seen: std::sync::Mutex<Vec<String>>,
        fail: bool,
    }

    impl FixedExchanger {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: std::sync::Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl TokenExchanger for FixedExchanger {
        async fn exchange(&self, code: &str) -> Result<TokenRecord, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(code.to_string());
            if self.fail {
                return Err(Error::TokenRejected {
                    status: 400,
                    body: "invalid_grant".into(),
                });
            }
            Ok(TokenRecord::new(
                "tok_xyz",
                Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
                "ref_456",
            ))
        }
    }

    async fn bind(
        store: &TokenStore,
        exchanger: Arc<FixedExchanger>,
    ) -> (CallbackServer, SocketAddr) {
        let server = CallbackServer::bind(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            "/callback",
            "default",
            store.clone(),
            exchanger,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        (server, addr)
    }

    #[tokio::test]
    async fn code_is_exchanged_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let exchanger = FixedExchanger::new(false);
        let (server, addr) = bind(&store, exchanger.clone()).await;
        let waiting = tokio::spawn(server.wait(None));

        let resp = reqwest::get(format!("http://{addr}/callback?code=abc123&state=state-token"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), SUCCESS_BODY);

        let record = waiting.await.unwrap().unwrap();
        assert_eq!(store.get_token("default").unwrap(), record);
        assert_eq!(*exchanger.seen.lock().unwrap(), vec!["abc123".to_string()]);
    }

    #[tokio::test]
    async fn missing_code_is_bad_request_without_store_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let exchanger = FixedExchanger::new(false);
        let (server, addr) = bind(&store, exchanger.clone()).await;
        let waiting = tokio::spawn(server.wait(None));

        let resp = reqwest::get(format!("http://{addr}/callback?error=access_denied"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.text().await.unwrap(), CODE_MISSING_BODY);

        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::AuthorizationCodeMissing));
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn exchange_failure_is_reported_and_nothing_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let (server, addr) = bind(&store, FixedExchanger::new(true)).await;
        let waiting = tokio::spawn(server.wait(None));

        let resp = reqwest::get(format!("http://{addr}/callback?code=stale"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let err = waiting.await.unwrap().unwrap_err();
        assert!(err.is_exchange());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn save_failure_is_reported_as_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("credentials.json"), "not json").unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let (server, addr) = bind(&store, FixedExchanger::new(false)).await;
        let waiting = tokio::spawn(server.wait(None));

        let resp = reqwest::get(format!("http://{addr}/callback?code=abc123"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.text().await.unwrap(), SAVE_FAILED_BODY);

        let err = waiting.await.unwrap().unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn other_paths_are_not_found_and_do_not_end_the_flow() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let exchanger = FixedExchanger::new(false);
        let (server, addr) = bind(&store, exchanger.clone()).await;
        let waiting = tokio::spawn(server.wait(None));

        let resp = reqwest::get(format!("http://{addr}/favicon.ico")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(!waiting.is_finished());

        let resp = reqwest::get(format!("http://{addr}/callback?code=abc123"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(waiting.await.unwrap().is_ok());
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_releases_port_after_callback() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let (server, addr) = bind(&store, FixedExchanger::new(false)).await;
        let waiting = tokio::spawn(server.wait(None));

        reqwest::get(format!("http://{addr}/callback?code=abc123"))
            .await
            .unwrap();
        waiting.await.unwrap().unwrap();

        // The same port can be bound again once the listener is gone.
        TcpListener::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_listener_start_error() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = taken.local_addr().unwrap();

        let result = CallbackServer::bind(
            addr,
            "/callback",
            "default",
            TokenStore::with_path("unused.json".into()),
            FixedExchanger::new(false),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(Error::ListenerStart { .. })));
    }

    #[tokio::test]
    async fn timeout_ends_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let (server, _addr) = bind(&store, FixedExchanger::new(false)).await;

        let err = server
            .wait(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthorizationTimedOut(_)));
    }

    /// Takes longer to exchange than the login timeout allows.
    struct SlowExchanger(Duration);

    #[async_trait]
    impl TokenExchanger for SlowExchanger {
        async fn exchange(&self, _code: &str) -> Result<TokenRecord, Error> {
            tokio::time::sleep(self.0).await;
            Ok(TokenRecord::new(
                "tok_slow",
                Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
                "",
            ))
        }
    }

    #[tokio::test]
    async fn timeout_does_not_cut_off_a_claimed_callback() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let server = CallbackServer::bind(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            "/callback",
            "default",
            store.clone(),
            Arc::new(SlowExchanger(Duration::from_millis(400))),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let waiting = tokio::spawn(server.wait(Some(Duration::from_millis(200))));

        let resp = reqwest::get(format!("http://{addr}/callback?code=abc123"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let record = waiting.await.unwrap().unwrap();
        assert_eq!(store.get_token("default").unwrap(), record);
    }

    #[tokio::test]
    async fn external_cancel_stops_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let shutdown = CancellationToken::new();
        let server = CallbackServer::bind(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            "/callback",
            "default",
            store,
            FixedExchanger::new(false),
            shutdown.clone(),
        )
        .await
        .unwrap();
        shutdown.cancel();

        let err = server.wait(None).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn second_callback_does_not_exchange_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("credentials.json"));
        let exchanger = FixedExchanger::new(false);
        // Outcome slot already taken by an earlier request.
        let state = Arc::new(CallbackState {
            profile: "default".into(),
            store: store.clone(),
            exchanger: exchanger.clone(),
            outcome: Mutex::new(None),
            claimed: CancellationToken::new(),
            shutdown: CancellationToken::new(),
        });

        let mut params = HashMap::new();
        params.insert("code".to_string(), "abc123".to_string());
        let (status, body) = handle_callback(State(state), Query(params)).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, ALREADY_HANDLED_BODY);
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
        assert!(!store.path().exists());
    }
}
