//! The payment-link backend, system of record for actions.

use futures::future::BoxFuture;
use linkcart_model::{Action, ActionId, ActionType, LinkId};
use thiserror::Error;
use tracing::{info, warn};

pub mod http;

pub use http::ActionApiHttpClient;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Another request holds the backend lock for this link.
    #[error("another request is already in flight for this link")]
    RequestLockExists,
    #[error("{0} not found")]
    NotFound(String),
    #[error("backend error {code}: {message}")]
    Api { code: String, message: String },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub trait ActionService: Send + Sync {
    fn create_action<'a>(
        &'a self,
        link_id: &'a LinkId,
        action_type: ActionType,
    ) -> BoxFuture<'a, Result<Action, BackendError>>;

    fn get_action<'a>(
        &'a self,
        link_id: &'a LinkId,
        action_type: ActionType,
    ) -> BoxFuture<'a, Result<Action, BackendError>>;

    fn process_action<'a>(
        &'a self,
        action_id: &'a ActionId,
    ) -> BoxFuture<'a, Result<Action, BackendError>>;
}

#[derive(Debug)]
pub struct CreatedAction {
    pub action: Action,
    /// The create lost the race to another request and this is the action that one made.
    pub contended: bool,
}

/// Creates the action, or picks up the one a concurrent request is creating. The create is
/// never retried.
pub async fn create_or_fetch_action(
    service: &dyn ActionService,
    link_id: &LinkId,
    action_type: ActionType,
) -> Result<CreatedAction, BackendError> {
    match service.create_action(link_id, action_type).await {
        Ok(action) => {
            info!("Created {} action {} on link {}", action_type, action.id, link_id);
            Ok(CreatedAction {
                action,
                contended: false,
            })
        }
        Err(BackendError::RequestLockExists) => {
            warn!(
                "{} action on link {} is already being created, fetching it",
                action_type, link_id
            );
            let action = service.get_action(link_id, action_type).await?;
            Ok(CreatedAction {
                action,
                contended: true,
            })
        }
        Err(e) => Err(e),
    }
}
