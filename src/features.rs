//! Feature flag resolution
//!
//! The Jam backend advertises optional capabilities (e.g. `logs`) at
//! `GET /jam/api/v0/features`, in one of two shapes:
//!
//! - map form: `{ "features": { "logs": true } }`
//! - list form: `{ "features": [{ "name": "logs", "enabled": true }] }`
//!
//! Anything the resolver cannot answer definitively falls back to the build
//! mode default (enabled only in development builds).

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::JmApiClient;
use crate::config::BuildMode;
use crate::error::SyncError;
use crate::session::Credential;

/// Outcome of resolving one capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureResolution {
    pub enabled: bool,
    /// False when the value is the build-mode fallback
    pub definitive: bool,
}

impl FeatureResolution {
    pub fn definitive(enabled: bool) -> Self {
        Self {
            enabled,
            definitive: true,
        }
    }

    pub fn fallback(build_mode: BuildMode) -> Self {
        Self {
            enabled: build_mode.is_development(),
            definitive: false,
        }
    }
}

/// Source of the raw features document
pub trait FeatureSource: Send + Sync + 'static {
    fn fetch_features(&self, token: &str) -> BoxFuture<'static, Result<Value, SyncError>>;
}

impl FeatureSource for JmApiClient {
    fn fetch_features(&self, token: &str) -> BoxFuture<'static, Result<Value, SyncError>> {
        let client = self.clone();
        let token = token.to_string();
        Box::pin(async move { client.get_features(&token).await })
    }
}

/// Recognized shapes of a features document
#[derive(Debug, PartialEq)]
pub enum FeaturesPayload {
    Flags(Map<String, Value>),
    Entries(Vec<Value>),
    Unrecognized,
}

impl FeaturesPayload {
    /// Classify a document, unwrapping an optional `features` envelope
    pub fn parse(document: Value) -> Self {
        let inner = match document {
            Value::Object(mut map) if map.contains_key("features") => map
                .remove("features")
                .unwrap_or(Value::Null),
            other => other,
        };

        match inner {
            Value::Object(map) => FeaturesPayload::Flags(map),
            Value::Array(entries) => FeaturesPayload::Entries(entries),
            _ => FeaturesPayload::Unrecognized,
        }
    }

    /// Definitive answer for `name`, if the document gives one
    pub fn lookup(&self, name: &str) -> Option<bool> {
        match self {
            FeaturesPayload::Flags(map) => map.get(name).and_then(Value::as_bool),
            FeaturesPayload::Entries(entries) => Some(entries.iter().any(|entry| {
                entry.get("name").and_then(Value::as_str) == Some(name)
                    && entry.get("enabled") == Some(&Value::Bool(true))
            })),
            FeaturesPayload::Unrecognized => None,
        }
    }
}

pub struct FeatureResolver<S: FeatureSource = JmApiClient> {
    source: Arc<S>,
    build_mode: BuildMode,
}

impl<S: FeatureSource> Clone for FeatureResolver<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            build_mode: self.build_mode,
        }
    }
}

impl<S: FeatureSource> FeatureResolver<S> {
    pub fn new(source: S, build_mode: BuildMode) -> Self {
        Self {
            source: Arc::new(source),
            build_mode,
        }
    }

    pub fn build_mode(&self) -> BuildMode {
        self.build_mode
    }

    /// Resolve one capability with a single request
    ///
    /// Never fails: transport errors, bad statuses and unknown shapes yield
    /// the non-definitive fallback. Dropping the future cancels the request.
    pub async fn resolve_feature(
        &self,
        name: &str,
        credential: Option<&Credential>,
    ) -> FeatureResolution {
        let Some(credential) = credential else {
            log::debug!("No credential, feature '{}' unresolved", name);
            return FeatureResolution::fallback(self.build_mode);
        };

        let document = match self.source.fetch_features(&credential.token).await {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Features request failed: {}", e);
                return FeatureResolution::fallback(self.build_mode);
            }
        };

        match FeaturesPayload::parse(document).lookup(name) {
            Some(enabled) => FeatureResolution::definitive(enabled),
            None => {
                log::warn!("Features response has no usable entry for '{}'", name);
                FeatureResolution::fallback(self.build_mode)
            }
        }
    }

    /// Keep a resolution current as the credential changes
    ///
    /// A credential change while a query is in flight cancels that query and
    /// starts a new one. The task ends when the credential sender is dropped.
    pub fn track(
        &self,
        name: impl Into<String>,
        mut credentials: watch::Receiver<Option<Credential>>,
    ) -> (watch::Receiver<FeatureResolution>, JoinHandle<()>) {
        let name = name.into();
        let resolver = self.clone();
        let (tx, rx) = watch::channel(FeatureResolution::fallback(self.build_mode));

        let handle = tokio::spawn(async move {
            loop {
                let credential = credentials.borrow_and_update().clone();
                tokio::select! {
                    resolution = resolver.resolve_feature(&name, credential.as_ref()) => {
                        tx.send_replace(resolution);
                        if credentials.changed().await.is_err() {
                            break;
                        }
                    }
                    changed = credentials.changed() => {
                        log::debug!("Credential changed, cancelling features query for '{}'", name);
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        (rx, handle)
    }
}
