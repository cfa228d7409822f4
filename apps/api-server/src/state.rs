//! Shared application state.

use std::sync::Arc;

use kasa_engine::Engine;

use crate::auth::JwtManager;

/// Handed to every handler. Cloning is cheap: the engine components share
/// one store handle and the JWT manager sits behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Engine,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    pub fn new(engine: Engine, jwt: JwtManager) -> Self {
        AppState {
            engine,
            jwt: Arc::new(jwt),
        }
    }
}
