use std::sync::Arc;

use axum::extract::FromRef;
use mixtape_core::{Mixtape, PgStore};

pub type Engine = Mixtape<PgStore>;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub engine: Arc<Engine>,
}
