use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use linkcart::backend::{ActionService, BackendError};
use linkcart_model::{Action, ActionId, ActionType, LinkId};

/// Canned answer of the backend. `BackendError` holds an `anyhow::Error` and cannot be cloned,
/// so errors are described here and built on demand.
#[derive(Clone, Debug)]
pub enum Answer {
    Action(Action),
    LockExists,
    NotFound,
    Api(&'static str),
}

impl Answer {
    fn to_result(&self) -> Result<Action, BackendError> {
        match self {
            Answer::Action(action) => Ok(action.clone()),
            Answer::LockExists => Err(BackendError::RequestLockExists),
            Answer::NotFound => Err(BackendError::NotFound("action".into())),
            Answer::Api(code) => Err(BackendError::Api {
                code: code.to_string(),
                message: "backend failure".into(),
            }),
        }
    }
}

pub struct MockBackend {
    create: Answer,
    get: Answer,
    process: Answer,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn processing_to(answer: Answer) -> Self {
        MockBackend {
            create: Answer::Api("unexpected"),
            get: Answer::NotFound,
            process: answer,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn creating(create: Answer, get: Answer) -> Self {
        MockBackend {
            create,
            get,
            process: Answer::Api("unexpected"),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ActionService for MockBackend {
    fn create_action<'a>(
        &'a self,
        link_id: &'a LinkId,
        action_type: ActionType,
    ) -> BoxFuture<'a, Result<Action, BackendError>> {
        self.record(format!("create {link_id} {action_type}"));
        futures::future::ready(self.create.to_result()).boxed()
    }

    fn get_action<'a>(
        &'a self,
        link_id: &'a LinkId,
        action_type: ActionType,
    ) -> BoxFuture<'a, Result<Action, BackendError>> {
        self.record(format!("get {link_id} {action_type}"));
        futures::future::ready(self.get.to_result()).boxed()
    }

    fn process_action<'a>(
        &'a self,
        action_id: &'a ActionId,
    ) -> BoxFuture<'a, Result<Action, BackendError>> {
        self.record(format!("process {action_id}"));
        futures::future::ready(self.process.to_result()).boxed()
    }
}
