use crate::config::Config;
use facegate_core::matching::{first_match, MatchError};
use facegate_core::{Embedding, FacePipeline, PipelineError};
use facegate_store::{IdentityStore, SqliteStore, StoreError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Terminal state of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new identity was created for this face.
    Registered(String),
    /// Some stored identity already matches this face; nothing was written.
    Duplicate,
}

/// Terminal state of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// First stored identity (in store enumeration order) within threshold.
    Authenticated(String),
    /// No stored identity matched.
    Unauthenticated,
}

/// Structural health of the daemon's collaborators.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub models_loaded: bool,
    pub store_available: bool,
    /// Stored identity-row count, when the store is reachable.
    pub identities: Option<usize>,
    pub match_threshold: f32,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Register {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<RegisterOutcome, EngineError>>,
    },
    Authenticate {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<AuthOutcome, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request registration: decode, locate, embed, scan for duplicates,
    /// create the identity if the face is novel.
    pub async fn register(&self, image: Vec<u8>) -> Result<RegisterOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Request authentication: decode, locate, embed, return the first
    /// matching stored identity.
    pub async fn authenticate(&self, image: Vec<u8>) -> Result<AuthOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Authenticate {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Structural health report; works even when models or store failed to
    /// initialize.
    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads both models and opens the store up front, deferring failures:
/// an absent model or unreachable database is logged and reported on the
/// first request that needs it, never at startup. All requests are served
/// sequentially by this one thread; independent daemon processes sharing a
/// database still race on scan-then-create.
pub fn spawn_engine(config: &Config) -> EngineHandle {
    let mut pipeline = FacePipeline::load(
        &config.locator_model_path(),
        &config.embedder_model_path(),
    );
    if pipeline.models_loaded() {
        tracing::info!(model_dir = %config.model_dir.display(), "face models loaded");
    }

    let mut store = match SqliteStore::open(&config.db_path) {
        Ok(s) => {
            tracing::info!(path = %config.db_path.display(), "identity store opened");
            Some(s)
        }
        Err(e) => {
            tracing::warn!(path = %config.db_path.display(), error = %e, "identity store unavailable");
            None
        }
    };

    let threshold = config.match_threshold;
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Register { image, reply } => {
                        let result =
                            run_register(&mut pipeline, store.as_mut(), threshold, &image);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Authenticate { image, reply } => {
                        let result =
                            run_authenticate(&mut pipeline, store.as_ref(), threshold, &image);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(run_status(&pipeline, store.as_ref(), threshold));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_register<S: IdentityStore>(
    pipeline: &mut FacePipeline,
    store: Option<&mut S>,
    threshold: f32,
    image: &[u8],
) -> Result<RegisterOutcome, EngineError> {
    let probe = pipeline.probe(image)?;
    let store = store.ok_or_else(|| {
        StoreError::Unavailable("store connection not established".into())
    })?;
    register_probe(store, &probe, threshold)
}

fn run_authenticate<S: IdentityStore>(
    pipeline: &mut FacePipeline,
    store: Option<&S>,
    threshold: f32,
    image: &[u8],
) -> Result<AuthOutcome, EngineError> {
    let probe = pipeline.probe(image)?;
    let store = store.ok_or_else(|| {
        StoreError::Unavailable("store connection not established".into())
    })?;
    authenticate_probe(store, &probe, threshold)
}

/// Register-if-novel: scan the entire stored population, create only when
/// no identity matches.
///
/// The duplicate scan and the insert are not atomic; two concurrent
/// registrations of the same face can both pass the scan and create two
/// identities. Duplicate suppression is best-effort.
fn register_probe<S: IdentityStore>(
    store: &mut S,
    probe: &Embedding,
    threshold: f32,
) -> Result<RegisterOutcome, EngineError> {
    let identities = store.list_all()?;
    if let Some(existing) = first_match(&identities, probe, threshold)? {
        tracing::info!(id = %existing.id, "register: face already known");
        return Ok(RegisterOutcome::Duplicate);
    }

    let id = store.create(probe)?;
    tracing::info!(%id, scanned = identities.len(), "register: new identity");
    Ok(RegisterOutcome::Registered(id))
}

/// Authenticate-if-known: first stored identity within threshold wins.
fn authenticate_probe<S: IdentityStore>(
    store: &S,
    probe: &Embedding,
    threshold: f32,
) -> Result<AuthOutcome, EngineError> {
    let identities = store.list_all()?;
    match first_match(&identities, probe, threshold)? {
        Some(identity) => {
            tracing::info!(id = %identity.id, "authenticate: match");
            Ok(AuthOutcome::Authenticated(identity.id.clone()))
        }
        None => {
            tracing::info!(scanned = identities.len(), "authenticate: no match");
            Ok(AuthOutcome::Unauthenticated)
        }
    }
}

fn run_status(
    pipeline: &FacePipeline,
    store: Option<&SqliteStore>,
    threshold: f32,
) -> StatusReport {
    StatusReport {
        models_loaded: pipeline.models_loaded(),
        store_available: store.is_some(),
        identities: store.and_then(|s| s.count().ok()),
        match_threshold: threshold,
    }
}
