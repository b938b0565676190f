use anyhow::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use linkcart_model::{Action, ActionId, ActionType, LinkId};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{ActionService, BackendError};

const LOCK_EXISTS: &str = "request_lock_already_exists";

#[derive(Serialize)]
struct CreateActionBody {
    action_type: ActionType,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

pub struct ActionApiHttpClient {
    pub url: Url,
    pub reqwest_client: reqwest::Client,
}

impl ActionApiHttpClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            url: Url::parse(url)?,
            reqwest_client: reqwest::Client::new(),
        })
    }

    pub async fn create(
        &self,
        link_id: &LinkId,
        action_type: ActionType,
    ) -> Result<Action, BackendError> {
        let response = self
            .reqwest_client
            .post(format!("{}v1/link/{link_id}/action", self.url))
            .json(&CreateActionBody { action_type })
            .send()
            .await
            .context(format!("creating {action_type} action on link {link_id}"))?;
        read_action(response, format!("link {link_id}")).await
    }

    pub async fn get(
        &self,
        link_id: &LinkId,
        action_type: ActionType,
    ) -> Result<Action, BackendError> {
        let response = self
            .reqwest_client
            .get(format!("{}v1/link/{link_id}/action/{action_type}", self.url))
            .header("Content-Type", "application/json")
            .send()
            .await
            .context(format!("getting {action_type} action of link {link_id}"))?;
        read_action(response, format!("{action_type} action of link {link_id}")).await
    }

    pub async fn process(&self, action_id: &ActionId) -> Result<Action, BackendError> {
        let response = self
            .reqwest_client
            .post(format!("{}v1/action/{action_id}/process", self.url))
            .header("Content-Type", "application/json")
            .send()
            .await
            .context(format!("processing action {action_id}"))?;
        read_action(response, format!("action {action_id}")).await
    }
}

async fn read_action(response: Response, what: String) -> Result<Action, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response
            .json::<Action>()
            .await
            .context(format!("reading {what}"))?);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound(what));
    }
    let body = response
        .text()
        .await
        .context(format!("reading error body for {what}"))?;
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) if error.code == LOCK_EXISTS => Err(BackendError::RequestLockExists),
        Ok(error) => Err(BackendError::Api {
            code: error.code,
            message: error.message,
        }),
        Err(_) => Err(BackendError::Api {
            code: status.as_u16().to_string(),
            message: body,
        }),
    }
}

impl ActionService for ActionApiHttpClient {
    fn create_action<'a>(
        &'a self,
        link_id: &'a LinkId,
        action_type: ActionType,
    ) -> BoxFuture<'a, Result<Action, BackendError>> {
        self.create(link_id, action_type).boxed()
    }

    fn get_action<'a>(
        &'a self,
        link_id: &'a LinkId,
        action_type: ActionType,
    ) -> BoxFuture<'a, Result<Action, BackendError>> {
        self.get(link_id, action_type).boxed()
    }

    fn process_action<'a>(
        &'a self,
        action_id: &'a ActionId,
    ) -> BoxFuture<'a, Result<Action, BackendError>> {
        self.process(action_id).boxed()
    }
}
