use linkcart_model::{
    Action, ActionState, ActionType, Asset, Intent, IntentPayload, IntentState, IntentTask,
    Principal, RemoteCallRequest, TransferPayload, Wallet,
};

pub fn canister(n: u8) -> Principal {
    Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, n, 1, 1])
}

pub fn ledger() -> Principal {
    canister(2)
}

pub fn user() -> Principal {
    Principal::from_slice(&[7; 29])
}

pub fn call(id: &str, method: &str) -> RemoteCallRequest {
    RemoteCallRequest {
        id: id.into(),
        module_id: ledger(),
        method: method.into(),
        arg: b"DIDL\x00\x00".to_vec(),
    }
}

pub fn intent(id: &str, task: IntentTask, amount: u128) -> Intent {
    Intent {
        id: id.into(),
        task,
        payload: IntentPayload::Transfer(TransferPayload {
            from: Wallet::new(user()),
            to: Wallet::new(canister(9)),
            asset: Asset {
                module_id: ledger(),
            },
            amount,
        }),
        created_at_ns: 1_700_000_000_000_000_000,
        state: IntentState::Created,
    }
}

pub fn action(action_type: ActionType, intents: Vec<Intent>) -> Action {
    Action {
        id: "action-1".into(),
        creator: user(),
        action_type,
        state: ActionState::Created,
        intents,
        call_batches: None,
    }
}

/// Escrow of 1 token into a new link, with its creation fee.
pub fn create_link_action() -> Action {
    let mut action = action(
        ActionType::CreateLink,
        vec![
            intent("fee", IntentTask::TransferWalletToTreasury, 0),
            intent("deposit", IntentTask::TransferWalletToLink, 100_000_000),
        ],
    );
    action.call_batches = Some(vec![
        vec![call("approve", "icrc2_approve")],
        vec![call("transfer", "icrc1_transfer")],
    ]);
    action
}

pub fn withdraw_action() -> Action {
    action(
        ActionType::Withdraw,
        vec![intent("withdraw", IntentTask::TransferLinkToWallet, 100_000_000)],
    )
}

/// What the backend answers after processing: same action, every intent in `state`.
pub fn settled(action: &Action, intent_state: IntentState, action_state: ActionState) -> Action {
    let mut settled = action.clone();
    for intent in settled.intents.iter_mut() {
        intent.state = intent_state;
    }
    settled.state = action_state;
    settled
}
