use crate::engine::{AuthOutcome, EngineError, EngineHandle, RegisterOutcome};
use facegate_core::PipelineError;
use facegate_store::StoreError;
use zbus::interface;

/// D-Bus interface for the Facegate identity daemon.
///
/// Bus name: org.facegate.Gate1
/// Object path: /org/facegate/Gate1
///
/// Terminal outcomes travel as JSON reply bodies; error kinds map onto
/// `fdo` errors (client-input problems as `InvalidArgs`, access control as
/// `AccessDenied`, everything else as `Failed`).
pub struct GateService {
    engine: EngineHandle,
}

impl GateService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.facegate.Gate1")]
impl GateService {
    /// Register a new identity from an encoded face image.
    ///
    /// Rejects the registration when any stored identity already matches.
    async fn register(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "register requested");
        match self.engine.register(image).await.map_err(to_fdo)? {
            RegisterOutcome::Registered(id) => Ok(serde_json::json!({
                "status": "registered",
                "user_id": id,
            })
            .to_string()),
            RegisterOutcome::Duplicate => Ok(serde_json::json!({
                "status": "duplicate",
            })
            .to_string()),
        }
    }

    /// Authenticate a face image against all registered identities.
    async fn authenticate(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "authenticate requested");
        match self.engine.authenticate(image).await.map_err(to_fdo)? {
            AuthOutcome::Authenticated(id) => Ok(serde_json::json!({
                "status": "authenticated",
                "user_id": id,
            })
            .to_string()),
            AuthOutcome::Unauthenticated => Ok(serde_json::json!({
                "status": "unauthenticated",
            })
            .to_string()),
        }
    }

    /// Return daemon status information.
    ///
    /// Available even when models or the store failed to initialize.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let report = self.engine.status().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "models_loaded": report.models_loaded,
            "store_available": report.store_available,
            "identities": report.identities,
            "match_threshold": report.match_threshold,
        })
        .to_string())
    }
}

/// Map engine errors 1:1 onto the D-Bus error taxonomy.
fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match &err {
        EngineError::Pipeline(
            PipelineError::InvalidImageFormat(_)
            | PipelineError::NoFaceDetected
            | PipelineError::MultipleFacesDetected { .. },
        ) => zbus::fdo::Error::InvalidArgs(err.to_string()),
        EngineError::Store(StoreError::PermissionDenied(_)) => {
            zbus::fdo::Error::AccessDenied(err.to_string())
        }
        _ => zbus::fdo::Error::Failed(err.to_string()),
    }
}
