//! Crash recovery and rollback between two gateways.
//!
//! Each test wires a client and a server crash manager to each other through
//! an in-process counterparty, with one wrapper ledger per gateway.

mod common;

use std::time::Duration;

use common::{exchange, log_row, GatewayPair, SESSION_ID};
use satp_hermes::recovery::CrashStatus;
use satp_hermes::session::{MessageType, SatpSession, SessionRole, State};
use satp_hermes::store::{LogRepository, DONE_OPERATION};

const STAGE_0: [MessageType; 4] = [
    MessageType::NewSessionRequest,
    MessageType::NewSessionResponse,
    MessageType::PreSatpTransferRequest,
    MessageType::PreSatpTransferResponse,
];

const STAGE_1: [MessageType; 4] = [
    MessageType::InitProposal,
    MessageType::InitReceipt,
    MessageType::TransferCommenceRequest,
    MessageType::TransferCommenceResponse,
];

const STAGE_2: [MessageType; 2] = [MessageType::LockAssert, MessageType::AssertionReceipt];

// ─────────────────────────────────────────────────────────────────────────────
// Recovery
// ─────────────────────────────────────────────────────────────────────────────

/// Client crashed after stage 1; the server logged stage 2 before noticing.
async fn make_crashed_client(pair: &GatewayPair) -> SatpSession {
    let mut client = pair.session_data(SessionRole::Client);
    exchange(&mut client, &STAGE_0);
    exchange(&mut client, &STAGE_1);
    client.last_sequence_number = 1;
    pair.client
        .append_log(log_row(&client, "transfer-commence", "init", 1))
        .await
        .unwrap();

    let mut server = pair.session_data(SessionRole::Server);
    exchange(&mut server, &STAGE_0);
    exchange(&mut server, &STAGE_1);
    pair.server
        .append_log(log_row(&server, "transfer-commence", DONE_OPERATION, 1))
        .await
        .unwrap();
    exchange(&mut server, &STAGE_2);
    server.last_sequence_number = 3;
    pair.server
        .append_log(log_row(&server, "lock-assert", DONE_OPERATION, 2))
        .await
        .unwrap();
    pair.server
        .append_log(log_row(&server, "assertion-receipt", DONE_OPERATION, 3))
        .await
        .unwrap();
    pair.server.insert_session(SatpSession::recreate_session(server).unwrap());

    SatpSession::recreate_session(client).unwrap()
}

#[tokio::test]
async fn test_recovery_merges_counterparty_logs() {
    let pair = GatewayPair::new().await;
    let mut session = make_crashed_client(&pair).await;

    let data = session.client_session_data().unwrap().clone();
    assert_eq!(pair.client.check_crash(&data).await, CrashStatus::InRecovery);

    pair.client.check_and_resolve_crash(&mut session).await.unwrap();

    let data = session.client_session_data().unwrap();
    assert_eq!(data.state, State::Recovered);
    assert_eq!(data.last_sequence_number, 3);
    assert!(data.hashes.has(MessageType::LockAssert));
    assert!(data.hashes.has(MessageType::AssertionReceipt));
    // Local values win over the counterparty's.
    assert_eq!(data.message_hash(MessageType::InitProposal), "hash-InitProposal");

    let rows = pair.client.log_repository().read_logs_not_proofs().await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.last().unwrap().sequence_number, 3);
}

#[tokio::test]
async fn test_restart_ignores_counterparty_rows() {
    let pair = GatewayPair::new().await;
    let mut session = make_crashed_client(&pair).await;
    pair.client.check_and_resolve_crash(&mut session).await.unwrap();

    // After a restart only the client's own row rebuilds a session.
    assert_eq!(pair.client.recover_sessions().await.unwrap(), 1);
    let handle = pair.client.session(SESSION_ID).unwrap();
    let restored = handle.lock().await;
    assert!(restored.has_client_session_data());
    assert!(!restored.has_server_session_data());
}

#[tokio::test]
async fn test_recovery_rejects_unknown_sender() {
    let pair = GatewayPair::new().await;
    let mut session = make_crashed_client(&pair).await;

    // The server expects a different client key, so every recover request fails
    // verification and the client falls back to a rollback.
    {
        let handle = pair.server.session(SESSION_ID).unwrap();
        let mut server_session = handle.lock().await;
        server_session
            .session_data_mut(SessionRole::Server)
            .unwrap()
            .client_gateway_pubkey = "00".repeat(32);
    }

    pair.client.check_and_resolve_crash(&mut session).await.unwrap();

    let data = session.client_session_data().unwrap();
    assert_ne!(data.state, State::Recovered);
    assert!(!data.hashes.has(MessageType::LockAssert));
}

// ─────────────────────────────────────────────────────────────────────────────
// Rollback
// ─────────────────────────────────────────────────────────────────────────────

fn track_server(pair: &GatewayPair, messages: &[&[MessageType]]) {
    let mut server = pair.session_data(SessionRole::Server);
    for stage in messages {
        exchange(&mut server, stage);
    }
    pair.server.insert_session(SatpSession::recreate_session(server).unwrap());
}

#[tokio::test]
async fn test_stage2_rollback_unlocks_sender_asset() {
    let pair = GatewayPair::new().await;
    pair.client_ledger.seed_token("asset-1", "0xalice", 100);

    let mut client = pair.session_data(SessionRole::Client);
    for stage in [&STAGE_0[..], &STAGE_1[..], &STAGE_2[..]] {
        exchange(&mut client, stage);
    }
    let mut session = SatpSession::recreate_session(client).unwrap();
    track_server(&pair, &[&STAGE_0, &STAGE_1, &STAGE_2]);

    assert!(pair.client.initiate_rollback(&mut session, SessionRole::Client, true).await);

    assert_eq!(pair.client_ledger.calls(), vec!["unlock"]);
    assert_eq!(pair.client_ledger.token("asset-1").unwrap().amount, 0);
    assert_eq!(session.session_state(), State::Rejected);

    // The server has nothing to compensate at stage 2 but still rejects.
    assert!(pair.server_ledger.calls().is_empty());
    let handle = pair.server.session(SESSION_ID).unwrap();
    assert_eq!(handle.lock().await.session_state(), State::Rejected);
}

#[tokio::test]
async fn test_stage3_rollback_reverses_burn() {
    let pair = GatewayPair::new().await;
    pair.client_ledger.seed_token("asset-1", "0xalice", 0);

    let mut client = pair.session_data(SessionRole::Client);
    for stage in [&STAGE_0[..], &STAGE_1[..], &STAGE_2[..]] {
        exchange(&mut client, stage);
    }
    exchange(
        &mut client,
        &[MessageType::CommitPrepare, MessageType::CommitReady, MessageType::CommitFinal],
    );
    let mut session = SatpSession::recreate_session(client).unwrap();
    track_server(&pair, &[&STAGE_0, &STAGE_1, &STAGE_2, &[MessageType::CommitReady]]);
    pair.server_ledger.seed_token("asset-1", "0xbridge", 100);

    assert!(pair.client.initiate_rollback(&mut session, SessionRole::Client, true).await);

    assert_eq!(pair.client_ledger.calls(), vec!["mint", "assign"]);
    let token = pair.client_ledger.token("asset-1").unwrap();
    assert_eq!(token.owner, "0xalice");
    assert_eq!(token.amount, 0);

    // The server minted after COMMIT_READY, so it burns.
    assert_eq!(pair.server_ledger.calls(), vec!["burn"]);
    assert_eq!(pair.server_ledger.token("asset-1").unwrap().amount, 0);
}

#[tokio::test]
async fn test_rollback_after_assignment_fails() {
    let pair = GatewayPair::new().await;
    let mut server = pair.session_data(SessionRole::Server);
    for stage in [&STAGE_0[..], &STAGE_1[..], &STAGE_2[..]] {
        exchange(&mut server, stage);
    }
    exchange(
        &mut server,
        &[MessageType::CommitReady, MessageType::AckCommitFinal],
    );
    let mut session = SatpSession::recreate_session(server).unwrap();

    assert!(!pair.server.initiate_rollback(&mut session, SessionRole::Server, true).await);
    assert_eq!(session.session_state(), State::Ongoing);
    assert!(pair.server_ledger.calls().is_empty());
}

#[tokio::test]
async fn test_failed_compensation_keeps_session_open() {
    let pair = GatewayPair::new().await;
    pair.client_ledger.seed_token("asset-1", "0xalice", 100);
    pair.client_ledger.fail_on("unlock");

    let mut client = pair.session_data(SessionRole::Client);
    for stage in [&STAGE_0[..], &STAGE_1[..], &STAGE_2[..]] {
        exchange(&mut client, stage);
    }
    let mut session = SatpSession::recreate_session(client).unwrap();
    track_server(&pair, &[&STAGE_0, &STAGE_1, &STAGE_2]);

    assert!(!pair.client.initiate_rollback(&mut session, SessionRole::Client, true).await);
    assert_eq!(session.session_state(), State::Ongoing);
    assert_eq!(pair.client_ledger.token("asset-1").unwrap().amount, 100);

    // The counterparty was never told.
    let handle = pair.server.session(SESSION_ID).unwrap();
    assert_eq!(handle.lock().await.session_state(), State::Ongoing);
}

#[tokio::test]
async fn test_timeout_triggers_rollback() {
    let pair = GatewayPair::new().await;
    pair.client_ledger.seed_token("asset-1", "0xalice", 100);

    let mut client = pair.session_data(SessionRole::Client);
    for stage in [&STAGE_0[..], &STAGE_1[..], &STAGE_2[..]] {
        exchange(&mut client, stage);
    }
    client.max_timeout = 0;
    let mut row = log_row(&client, "lock-assert", DONE_OPERATION, 1);
    row.timestamp = (chrono::Utc::now().timestamp_millis() - 1_000).to_string();
    pair.client.append_log(row).await.unwrap();
    track_server(&pair, &[&STAGE_0, &STAGE_1, &STAGE_2]);

    let mut session = SatpSession::recreate_session(client).unwrap();
    pair.client.check_and_resolve_crash(&mut session).await.unwrap();

    assert_eq!(session.session_state(), State::Rejected);
    assert_eq!(pair.client_ledger.calls(), vec!["unlock"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scheduler_recovers_tracked_session() {
    let pair = GatewayPair::new().await;
    let session = make_crashed_client(&pair).await;
    let handle = pair.client.insert_session(session);

    pair.client.start_scheduler();
    let mut recovered = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let session = handle.lock().await;
        if session.client_session_data().unwrap().hashes.has(MessageType::AssertionReceipt) {
            recovered = true;
            break;
        }
    }
    pair.client.stop_scheduler();

    assert!(recovered);
    assert!(!pair.client.is_scheduler_running());
}
