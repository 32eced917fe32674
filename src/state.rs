use crate::service::NodeService;
use std::sync::Arc;

pub struct AppState {
    pub service: Arc<NodeService>,
}
