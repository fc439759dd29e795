use std::sync::Arc;

use crate::application::admin::AdminCacheService;

#[derive(Clone)]
pub struct ApiState {
    pub admin: AdminCacheService,
    /// Calls are rejected when no token is configured.
    pub admin_token: Option<Arc<str>>,
}
