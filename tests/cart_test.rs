#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;
use std::sync::Arc;

use fixtures::actions::{action, canister, create_link_action, ledger, settled, withdraw_action};
use fixtures::backend::{Answer, MockBackend};
use fixtures::executor::{Behavior, MockExecutor};
use linkcart::backend::{create_or_fetch_action, BackendError};
use linkcart::dispatcher::BatchDispatcher;
use linkcart::{CartError, CartStage, TransactionCart};
use linkcart_crypto::{AnonymousIdentity, Identity, Secp256k1Identity};
use linkcart_model::{
    ActionState, ActionType, ActionValidationError, AmountAndFee, CallError, CallId, IntentState,
    IntentTask, LinkId,
};

mod fixtures;

const ALL_STAGES: [CartStage; 4] = [
    CartStage::NotStarted,
    CartStage::BatchesRunning,
    CartStage::Processing,
    CartStage::Done,
];

fn cart_with(
    identity: Arc<dyn Identity>,
    executor: &Arc<MockExecutor>,
    backend: &Arc<MockBackend>,
) -> TransactionCart {
    TransactionCart::new(
        identity,
        BatchDispatcher::new(executor.clone()),
        backend.clone(),
    )
}

fn user_cart(executor: &Arc<MockExecutor>, backend: &Arc<MockBackend>) -> TransactionCart {
    cart_with(Arc::new(Secp256k1Identity::random()), executor, backend)
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_anonymous_identity_is_refused_before_any_call() {
    let executor = Arc::new(MockExecutor::new());
    let backend = Arc::new(MockBackend::processing_to(Answer::NotFound));
    let cart = cart_with(Arc::new(AnonymousIdentity), &executor, &backend);

    let result = cart.execute(create_link_action()).await;

    assert!(matches!(result, Err(CartError::Unauthenticated)));
    assert_eq!(executor.executed(), 0);
    assert!(backend.calls().is_empty());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_invalid_action_is_refused_before_any_call() {
    let executor = Arc::new(MockExecutor::new());
    let backend = Arc::new(MockBackend::processing_to(Answer::NotFound));
    let cart = user_cart(&executor, &backend);

    let result = cart.execute(action(ActionType::Withdraw, vec![])).await;
    assert!(matches!(
        result,
        Err(CartError::InvalidAction(ActionValidationError::NoIntents(_)))
    ));

    let mut wrong_task = withdraw_action();
    wrong_task.intents[0].task = IntentTask::TransferWalletToLink;
    let result = cart.execute(wrong_task).await;
    assert!(matches!(
        result,
        Err(CartError::InvalidAction(
            ActionValidationError::TaskNotAllowed { .. }
        ))
    ));

    assert_eq!(executor.executed(), 0);
    assert!(backend.calls().is_empty());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_create_link() {
    let submitted = create_link_action();
    let backend = Arc::new(MockBackend::processing_to(Answer::Action(settled(
        &submitted,
        IntentState::Success,
        ActionState::Success,
    ))));
    let executor = Arc::new(MockExecutor::new());
    let cart = user_cart(&executor, &backend);

    let result = cart.execute(submitted).await.unwrap();

    assert!(result.is_success, "{:?}", result.errors);
    assert!(result.errors.is_empty());
    assert_eq!(result.batch_results.len(), 2);
    assert!(result.batch_results[0][&CallId::from("approve")].is_ok());
    assert!(result.batch_results[1][&CallId::from("transfer")].is_ok());
    assert_eq!(result.action.state, ActionState::Success);
    assert!(result
        .action
        .intents
        .iter()
        .all(|i| i.state == IntentState::Success));
    assert_eq!(result.stages, ALL_STAGES);
    assert_eq!(backend.calls(), vec!["process action-1"]);
    // The approval is settled before the transfer starts.
    assert!(executor.span("transfer").started >= executor.span("approve").finished);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_action_without_calls_still_goes_through_every_stage() {
    let submitted = withdraw_action();
    let backend = Arc::new(MockBackend::processing_to(Answer::Action(settled(
        &submitted,
        IntentState::Success,
        ActionState::Success,
    ))));
    let executor = Arc::new(MockExecutor::new());
    let cart = user_cart(&executor, &backend);

    let result = cart.execute(submitted).await.unwrap();

    assert!(result.is_success);
    assert!(result.batch_results.is_empty());
    assert_eq!(executor.executed(), 0);
    assert_eq!(result.stages, ALL_STAGES);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_failed_calls_are_reported_and_backend_decides() {
    let submitted = create_link_action();
    let backend = Arc::new(MockBackend::processing_to(Answer::Action(settled(
        &submitted,
        IntentState::Fail,
        ActionState::Fail,
    ))));
    let executor = Arc::new(MockExecutor::new().with("approve", Behavior::PanicWhenPolled));
    let cart = user_cart(&executor, &backend);

    let result = cart.execute(submitted).await.unwrap();

    assert!(!result.is_success);
    assert_eq!(result.errors.len(), 1);
    match &result.errors[0] {
        CartError::Call {
            batch,
            call_id,
            error,
        } => {
            assert_eq!(*batch, 0);
            assert_eq!(call_id, &CallId::from("approve"));
            assert_eq!(error.code, CallError::CAPTURED);
        }
        other => panic!("unexpected error {other:?}"),
    }
    // The second batch still ran and the backend was still asked.
    assert!(result.batch_results[1][&CallId::from("transfer")].is_ok());
    assert_eq!(backend.calls(), vec!["process action-1"]);
    assert_eq!(result.action.state, ActionState::Fail);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_backend_failure_keeps_local_states() {
    let backend = Arc::new(MockBackend::processing_to(Answer::LockExists));
    let executor = Arc::new(MockExecutor::new());
    let cart = user_cart(&executor, &backend);

    let result = cart.execute(create_link_action()).await.unwrap();

    assert!(!result.is_success);
    assert!(matches!(
        result.errors.as_slice(),
        [CartError::Backend(BackendError::RequestLockExists)]
    ));
    // Successful calls alone never mark anything successful.
    assert_eq!(result.action.state, ActionState::Created);
    assert!(result
        .action
        .intents
        .iter()
        .all(|i| i.state == IntentState::Created));
    assert_eq!(result.stages, ALL_STAGES);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_illegal_backend_transition_is_reported() {
    let mut submitted = withdraw_action();
    submitted.intents[0].state = IntentState::Success;
    let backend = Arc::new(MockBackend::processing_to(Answer::Action(settled(
        &submitted,
        IntentState::Created,
        ActionState::Created,
    ))));
    let executor = Arc::new(MockExecutor::new());
    let cart = user_cart(&executor, &backend);

    let result = cart.execute(submitted).await.unwrap();

    assert!(!result.is_success);
    match result.errors.as_slice() {
        [CartError::StateSync { intent, source }] => {
            assert_eq!(intent.0, "withdraw");
            assert_eq!(source.from, IntentState::Success);
            assert_eq!(source.to, IntentState::Created);
        }
        other => panic!("unexpected errors {other:?}"),
    }
    assert_eq!(result.action.intents[0].state, IntentState::Success);
    assert_eq!(result.action.state, ActionState::Created);
}

#[test]
fn test_quote() {
    let fees = BTreeMap::from([(ledger(), 10_000)]);

    let quotes = TransactionCart::quote(&create_link_action(), &fees).unwrap();

    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes[0].fee_label, Some("Link creation fee"));
    assert_eq!(
        quotes[0].amount_and_fee,
        AmountAndFee {
            amount: 20_000,
            fee: Some(20_000)
        }
    );
    assert_eq!(quotes[1].fee_label, None);
    assert_eq!(
        quotes[1].amount_and_fee,
        AmountAndFee {
            amount: 100_010_000,
            fee: Some(10_000)
        }
    );
}

#[test]
fn test_quote_needs_every_ledger_fee() {
    let fees = BTreeMap::from([(canister(3), 10_000)]);

    let error = TransactionCart::quote(&withdraw_action(), &fees).unwrap_err();

    assert!(matches!(error, CartError::MissingLedgerFee(asset) if asset == ledger()));
}

#[test_log::test(tokio::test)]
async fn test_create_or_fetch_action() {
    let link = LinkId::from("link-1");
    let existing = withdraw_action();

    let backend = MockBackend::creating(Answer::Action(existing.clone()), Answer::NotFound);
    let created = create_or_fetch_action(&backend, &link, ActionType::Withdraw)
        .await
        .unwrap();
    assert!(!created.contended);
    assert_eq!(backend.calls(), vec!["create link-1 Withdraw"]);

    let backend = MockBackend::creating(Answer::LockExists, Answer::Action(existing.clone()));
    let created = create_or_fetch_action(&backend, &link, ActionType::Withdraw)
        .await
        .unwrap();
    assert!(created.contended);
    assert_eq!(created.action, existing);
    assert_eq!(
        backend.calls(),
        vec!["create link-1 Withdraw", "get link-1 Withdraw"]
    );

    let backend = MockBackend::creating(Answer::Api("link_not_active"), Answer::NotFound);
    let error = create_or_fetch_action(&backend, &link, ActionType::Withdraw)
        .await
        .unwrap_err();
    assert!(matches!(error, BackendError::Api { code, .. } if code == "link_not_active"));
    assert_eq!(backend.calls().len(), 1);
}
