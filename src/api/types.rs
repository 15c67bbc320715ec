//! Shared types for the HTTP API layer.

use std::sync::Arc;

use crate::core_state::CoreState;
use crate::pipeline::vision::preprocess::MAX_IMAGE_BYTES;

/// Request body limit on `/api/identify`: one image plus multipart framing.
pub const MAX_UPLOAD_BYTES: usize = MAX_IMAGE_BYTES + 1024 * 1024;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}
