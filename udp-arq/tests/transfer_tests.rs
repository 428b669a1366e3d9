//! End-to-end transfers between in-process engines over loopback.
//!
//! The receiver runs in a spawned tokio task, the sender in the test task.
//! Impaired runs wrap each side's socket in a seeded [`Simulator`] so any
//! failure replays identically.

use std::path::PathBuf;
use std::time::Duration;

use udp_arq::chunk::MAX_FILE_SIZE;
use udp_arq::packet;
use udp_arq::simulator::{Simulator, SimulatorConfig};
use udp_arq::socket::{Socket, Transport};
use udp_arq::state::{ReceiverState, SenderState};
use udp_arq::{
    ArqVariant, ReceiverConfig, ReceiverEngine, SenderConfig, SenderEngine, TransferError,
};

const RTO: Duration = Duration::from_millis(20);
const TEST_DEADLINE: Duration = Duration::from_secs(30);

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> Socket {
    let addr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("udp-arq-{}-{name}", std::process::id()))
}

/// Run one transfer with the given fault models and return what the
/// receiver reconstructed.
async fn round_trip(
    variant: ArqVariant,
    window: u32,
    data: Vec<u8>,
    send_faults: SimulatorConfig,
    recv_faults: SimulatorConfig,
) -> Vec<u8> {
    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;
    let send_sock = ephemeral().await;

    let rconfig = ReceiverConfig::new(recv_addr, variant).with_window_size(window);
    let receiver = tokio::spawn(async move {
        let mut engine = ReceiverEngine::new(Simulator::new(recv_sock, recv_faults), rconfig);
        let result = engine.receive().await;
        assert_eq!(engine.state(), ReceiverState::Done);
        result
    });

    let sconfig =
        SenderConfig::new(recv_addr, RTO, window, variant).with_final_retry_budget(200);
    let mut sender = SenderEngine::new(Simulator::new(send_sock, send_faults), sconfig);

    let run = async {
        let report = sender.send_bytes(&data).await.expect("send");
        let (received, rreport) = receiver.await.unwrap().expect("receive");
        (report, received, rreport)
    };
    let (report, received, rreport) = tokio::time::timeout(TEST_DEADLINE, run)
        .await
        .expect("transfer did not finish in time");

    assert_eq!(sender.state(), SenderState::Complete);
    assert_eq!(report.bytes, data.len() as u64);
    assert_eq!(rreport.bytes, data.len() as u64);
    assert_eq!(rreport.chunks, report.chunks);
    received
}

fn impaired(seed: u64) -> SimulatorConfig {
    SimulatorConfig {
        loss_rate: 0.1,
        duplicate_rate: 0.1,
        reorder_rate: 0.1,
        seed,
    }
}

// ---------------------------------------------------------------------------
// Clean channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gbn_round_trip_clean() {
    let data = sample(10_000);
    let got = round_trip(
        ArqVariant::GoBackN,
        4,
        data.clone(),
        SimulatorConfig::default(),
        SimulatorConfig::default(),
    )
    .await;
    assert_eq!(got, data);
}

#[tokio::test]
async fn sr_round_trip_clean() {
    let data = sample(10_000);
    let got = round_trip(
        ArqVariant::SelectiveRepeat,
        4,
        data.clone(),
        SimulatorConfig::default(),
        SimulatorConfig::default(),
    )
    .await;
    assert_eq!(got, data);
}

#[tokio::test]
async fn exact_multiple_of_chunk_size() {
    for variant in [ArqVariant::GoBackN, ArqVariant::SelectiveRepeat] {
        let data = sample(4 * 1024);
        let got = round_trip(
            variant,
            2,
            data.clone(),
            SimulatorConfig::default(),
            SimulatorConfig::default(),
        )
        .await;
        assert_eq!(got, data, "{variant}");
    }
}

#[tokio::test]
async fn empty_file_round_trip() {
    for variant in [ArqVariant::GoBackN, ArqVariant::SelectiveRepeat] {
        let got = round_trip(
            variant,
            4,
            Vec::new(),
            SimulatorConfig::default(),
            SimulatorConfig::default(),
        )
        .await;
        assert!(got.is_empty(), "{variant}");
    }
}

// ---------------------------------------------------------------------------
// Impaired channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gbn_survives_loss_duplication_and_reordering() {
    let data = sample(50_000);
    let got = round_trip(ArqVariant::GoBackN, 8, data.clone(), impaired(11), impaired(12)).await;
    assert_eq!(got, data);
}

#[tokio::test]
async fn sr_survives_loss_duplication_and_reordering() {
    let data = sample(50_000);
    let got = round_trip(
        ArqVariant::SelectiveRepeat,
        8,
        data.clone(),
        impaired(21),
        impaired(22),
    )
    .await;
    assert_eq!(got, data);
}

#[tokio::test]
async fn stop_and_wait_window_under_loss() {
    let data = sample(6_000);
    for variant in [ArqVariant::GoBackN, ArqVariant::SelectiveRepeat] {
        let got = round_trip(
            variant,
            1,
            data.clone(),
            SimulatorConfig::lossy(0.2, 31),
            SimulatorConfig::lossy(0.2, 32),
        )
        .await;
        assert_eq!(got, data, "{variant}");
    }
}

#[tokio::test]
async fn malformed_datagrams_are_ignored() {
    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;
    let mut send_sock = ephemeral().await;

    // Too short to be a frame, then a frame with an oversized payload.
    send_sock.send_to(&[0x00], recv_addr).await.unwrap();
    let mut oversized = vec![0x00, 0x01, packet::flags::FINAL];
    oversized.resize(packet::HEADER_LEN + packet::MAX_PAYLOAD + 1, 0xAA);
    send_sock.send_to(&oversized, recv_addr).await.unwrap();

    let rconfig = ReceiverConfig::new(recv_addr, ArqVariant::GoBackN);
    let receiver = tokio::spawn(async move {
        ReceiverEngine::new(recv_sock, rconfig).receive().await
    });

    let data = sample(3_000);
    let sconfig = SenderConfig::new(recv_addr, RTO, 4, ArqVariant::GoBackN);
    let mut sender = SenderEngine::new(send_sock, sconfig);
    tokio::time::timeout(TEST_DEADLINE, sender.send_bytes(&data))
        .await
        .expect("send timed out")
        .expect("send");

    let (got, _) = receiver.await.unwrap().expect("receive");
    assert_eq!(got, data);
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lost_final_ack_exhausts_budget() {
    // The peer exists but never reads, so no ack ever comes back.
    for variant in [ArqVariant::GoBackN, ArqVariant::SelectiveRepeat] {
        let blackhole = ephemeral().await;
        let config = SenderConfig::new(blackhole.local_addr, Duration::from_millis(5), 4, variant);
        let mut sender = SenderEngine::new(
            Simulator::new(ephemeral().await, SimulatorConfig::default()),
            config,
        );

        let err = tokio::time::timeout(TEST_DEADLINE, sender.send_bytes(b"into the void"))
            .await
            .expect("sender must give up on its own")
            .unwrap_err();

        assert!(
            matches!(err, TransferError::TransferIncomplete { retransmissions: 15 }),
            "{variant}: {err}"
        );
        assert_eq!(err.exit_code(), 5);
        assert_eq!(sender.state(), SenderState::Aborted);

        // One first transmission plus exactly 15 retransmissions.
        let stats = sender.into_transport().stats();
        assert_eq!(stats.offered, 16, "{variant}");
    }
}

#[tokio::test]
async fn oversized_file_fails_before_any_send() {
    let path = temp_path("oversized.bin");
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(MAX_FILE_SIZE + 1).unwrap();
    drop(file);

    let blackhole = ephemeral().await;
    let config = SenderConfig::new(blackhole.local_addr, RTO, 4, ArqVariant::GoBackN);
    let mut sender = SenderEngine::new(
        Simulator::new(ephemeral().await, SimulatorConfig::default()),
        config.clone(),
    );

    let err = sender.send_file(&path).await.unwrap_err();
    assert!(matches!(err, TransferError::Precondition(_)), "{err}");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(sender.state(), SenderState::Idle);
    assert_eq!(sender.into_transport().stats().offered, 0);

    let err = udp_arq::send_file(config, &path).await.unwrap_err();
    assert!(matches!(err, TransferError::Precondition(_)));

    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn largest_file_passes_size_check() {
    let path = temp_path("at-limit.bin");
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(MAX_FILE_SIZE).unwrap();
    drop(file);

    let data = udp_arq::sender_engine::load_file(&path).await.unwrap();
    assert_eq!(data.len() as u64, MAX_FILE_SIZE);

    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn idle_receiver_reports_first_gap() {
    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;

    let rconfig = ReceiverConfig::new(recv_addr, ArqVariant::SelectiveRepeat)
        .with_idle_timeout(Duration::from_millis(200));
    let receiver = tokio::spawn(async move {
        let mut engine = ReceiverEngine::new(recv_sock, rconfig);
        let result = engine.receive().await;
        (result, engine.state())
    });

    // Packets 1 and 3 (final) arrive; 2 never does.
    let mut peer = ephemeral().await;
    peer.send_to(&packet::encode(1, false, b"one"), recv_addr).await.unwrap();
    peer.send_to(&packet::encode(3, true, b"three"), recv_addr).await.unwrap();

    // A stranger cannot fill the hole once the receiver has locked on.
    let mut stranger = ephemeral().await;
    stranger.send_to(&packet::encode(2, false, b"two"), recv_addr).await.unwrap();

    let mut acks = Vec::new();
    while let Some((d, _)) = peer.recv_timeout(Duration::from_millis(100)).await.unwrap() {
        acks.push(packet::Ack::decode(&d).unwrap().seq);
    }
    assert_eq!(acks, vec![1, 3]);
    assert!(stranger
        .recv_timeout(Duration::from_millis(50))
        .await
        .unwrap()
        .is_none());

    let (result, state) = tokio::time::timeout(TEST_DEADLINE, receiver)
        .await
        .expect("receiver must give up on its own")
        .unwrap();
    let err = result.unwrap_err();
    assert!(matches!(err, TransferError::ReassemblyGap { seq: 2 }), "{err}");
    assert_eq!(err.exit_code(), 4);
    assert_eq!(state, ReceiverState::Done);
}

#[tokio::test]
async fn gbn_receiver_answers_gap_with_duplicate_ack() {
    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;

    let rconfig = ReceiverConfig::new(recv_addr, ArqVariant::GoBackN)
        .with_idle_timeout(Duration::from_millis(200));
    let receiver = tokio::spawn(async move {
        ReceiverEngine::new(recv_sock, rconfig).receive().await
    });

    let mut peer = ephemeral().await;
    peer.send_to(&packet::encode(1, false, b"a"), recv_addr).await.unwrap();
    peer.send_to(&packet::encode(3, true, b"c"), recv_addr).await.unwrap();

    let mut acks = Vec::new();
    while let Some((d, _)) = peer.recv_timeout(Duration::from_millis(100)).await.unwrap() {
        acks.push(packet::Ack::decode(&d).unwrap().seq);
    }
    assert_eq!(acks, vec![1, 1]);

    let err = receiver.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::ReassemblyGap { seq: 2 }), "{err}");
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_file_to_receive_file() {
    let input = temp_path("input.bin");
    let output = temp_path("output.bin");
    let data = sample(7_777);
    std::fs::write(&input, &data).unwrap();

    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;
    let rconfig = ReceiverConfig::new(recv_addr, ArqVariant::SelectiveRepeat).with_window_size(5);
    let out = output.clone();
    let receiver = tokio::spawn(async move {
        ReceiverEngine::new(recv_sock, rconfig).receive_file(&out).await
    });

    let sconfig = SenderConfig::new(recv_addr, RTO, 5, ArqVariant::SelectiveRepeat);
    let report = tokio::time::timeout(TEST_DEADLINE, udp_arq::send_file(sconfig, &input))
        .await
        .expect("send timed out")
        .expect("send");
    assert_eq!(report.bytes, data.len() as u64);
    assert_eq!(report.chunks, 8);
    assert!(report.throughput() > 0.0);

    let rreport = receiver.await.unwrap().expect("receive");
    assert_eq!(rreport.bytes, data.len() as u64);
    assert_eq!(std::fs::read(&output).unwrap(), data);

    std::fs::remove_file(&input).unwrap();
    std::fs::remove_file(&output).unwrap();
}

#[tokio::test]
async fn unwritable_output_is_a_file_error() {
    let recv_sock = ephemeral().await;
    let recv_addr = recv_sock.local_addr;
    let bad = temp_path("no-such-dir").join("out.bin");

    let rconfig = ReceiverConfig::new(recv_addr, ArqVariant::GoBackN);
    let receiver = tokio::spawn(async move {
        ReceiverEngine::new(recv_sock, rconfig).receive_file(&bad).await
    });

    let sconfig = SenderConfig::new(recv_addr, RTO, 4, ArqVariant::GoBackN);
    SenderEngine::new(ephemeral().await, sconfig)
        .send_bytes(b"payload")
        .await
        .expect("send");

    let err = receiver.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::File { .. }), "{err}");
    assert_eq!(err.exit_code(), 6);
}
