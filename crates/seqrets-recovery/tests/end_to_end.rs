//! Full backup and restore flows across every share source.

use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use seqrets_card::{CardPolicy, CardService, FileTransport, MemoryTransport};
use seqrets_chunks::encode_text;
use seqrets_core::{CardError, RawInstruction, SeqretsError, Share};
use seqrets_crypto::{split, KdfParams};
use seqrets_recovery::{
    parse_item, qard_frames, scan_chunks, seal_instruction, CameraFeed, CardImport, FileImport,
    Ingest, ManualEntry, RecoverySession, RestoreStatus, ScanOutcome, SealOptions, ShareSource,
};

const SECRET: &[u8; 32] = b"\x01\x02\x03\x04 the wallet master key bytes";
const READER: &str = "reader-0";

fn pin(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

fn only_share(items: Vec<Ingest>) -> Share {
    match items.into_iter().next() {
        Some(Ingest::Share(share)) => share,
        other => panic!("expected one share, got {other:?}"),
    }
}

async fn share_from_card(share: &Share) -> Share {
    let transport = MemoryTransport::new();
    transport.insert_card(READER, 4096).unwrap();

    let writer = CardService::new(transport.clone(), CardPolicy::default(), Duration::from_secs(5));
    writer.set_pin(READER, pin("8642")).await.unwrap();
    writer
        .write_share_to_card(READER, share.clone(), "qard 1")
        .await
        .unwrap();

    // A second host sees the same token with no verified session.
    let reader = CardService::new(transport, CardPolicy::default(), Duration::from_secs(5));
    let err = CardImport.fetch(&reader, READER).await.unwrap_err();
    assert!(matches!(err, SeqretsError::Card(CardError::NotVerified)));

    reader.verify_pin(READER, pin("8642")).await.unwrap();
    only_share(CardImport.fetch(&reader, READER).await.unwrap())
}

fn share_from_camera(share: &Share) -> Share {
    // Sized so the Qard spans exactly three QR codes.
    let json = share.to_json().unwrap();
    let frames = encode_text(json.as_bytes(), json.len().div_ceil(3)).unwrap();
    assert_eq!(frames.len(), 3);

    // Out of order, with the first frame scanned twice.
    let mut camera = CameraFeed::new();
    let mut out = Vec::new();
    out.extend(camera.submit(frames[0].as_bytes()).unwrap());
    for frame in frames.iter().rev() {
        out.extend(camera.submit(frame.as_bytes()).unwrap());
    }
    only_share(out)
}

fn share_from_manual(share: &Share) -> Share {
    let typed = format!("  {}\n", share.to_json().unwrap());
    only_share(ManualEntry.submit(typed.as_bytes()).unwrap())
}

#[tokio::test]
async fn two_of_three_across_card_qr_and_manual() {
    let shares = split(SECRET, 2, 3, "wallet").unwrap();

    let from_card = share_from_card(&shares[0]).await;
    let from_qr = share_from_camera(&shares[1]);
    let from_manual = share_from_manual(&shares[2]);
    assert_eq!(from_card, shares[0]);
    assert_eq!(from_qr, shares[1]);
    assert_eq!(from_manual, shares[2]);

    let collected = [from_card, from_qr, from_manual];
    for (a, b) in [(0, 1), (0, 2), (1, 2), (2, 0)] {
        let mut session = RecoverySession::new();
        session.add_share(collected[a].clone()).unwrap();
        assert_eq!(
            session.restore(None, None).status,
            RestoreStatus::Collecting
        );
        session.add_share(collected[b].clone()).unwrap();

        let result = session.restore(None, None);
        assert_eq!(result.status, RestoreStatus::SecretRecovered);
        assert_eq!(result.secret.unwrap().as_bytes(), SECRET);
        assert!(result.error.is_none());
    }
}

#[tokio::test]
async fn sealed_vault_restored_from_card_and_file() {
    let tmp = tempfile::tempdir().unwrap();
    let password = pin("long and careful passphrase");
    let instruction = RawInstruction::from_bytes(
        "instructions.txt",
        b"The hardware wallet is in the safe deposit box.",
        "text/plain",
    );
    let opts = SealOptions {
        threshold: 2,
        total_shares: 3,
        label: "estate".into(),
        kdf: KdfParams::insecure_fast(),
    };
    let exported = seal_instruction(&instruction, &password, None, &opts).unwrap();

    let transport = FileTransport::new(tmp.path().join("cards"), 16 * 1024);
    transport.insert_blank(READER).unwrap();
    let service = CardService::new(transport, CardPolicy::default(), Duration::from_secs(5));
    service
        .write_vault_to_card(READER, exported.vault.to_json().unwrap(), "estate vault")
        .await
        .unwrap();

    let share_file = share_file_json(&exported.shares[..2]);

    let mut session = RecoverySession::new();
    let mut card = CardImport;
    for item in card.fetch(&service, READER).await.unwrap() {
        session.ingest(item).unwrap();
    }
    assert!(session.vault().is_some());

    let report = session
        .submit(&mut FileImport, share_file.as_bytes())
        .unwrap();
    assert_eq!(report.shares_added, 2);
    assert!(session.is_ready());

    let missing = session.restore(None, None);
    assert_eq!(missing.status, RestoreStatus::Failed);

    let result = session.restore(Some(&password), None);
    assert_eq!(result.status, RestoreStatus::InstructionDecrypted);
    assert_eq!(result.label.as_deref(), Some("estate"));
    assert_eq!(result.instruction.unwrap(), instruction);
}

fn share_file_json(shares: &[Share]) -> String {
    let items: Vec<String> = shares.iter().map(|s| s.to_json().unwrap()).collect();
    format!("[{}]", items.join(",\n"))
}

#[tokio::test]
async fn live_scan_feeds_session() {
    let shares = split(SECRET, 2, 2, "scan").unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    let mut session = RecoverySession::new();
    for share in &shares {
        let frames = qard_frames(share, 32).unwrap();
        let feeder = tx.clone();
        tokio::spawn(async move {
            for frame in frames.into_iter().rev() {
                if feeder.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let ScanOutcome::Complete(bytes) = scan_chunks(&mut rx, &cancel).await else {
            panic!("scan did not complete");
        };
        let item = parse_item(std::str::from_utf8(&bytes).unwrap()).unwrap();
        session.ingest(item).unwrap();
    }

    let result = session.restore(None, None);
    assert_eq!(result.status, RestoreStatus::SecretRecovered);
    assert_eq!(result.secret.unwrap().as_bytes(), SECRET);

    cancel.cancel();
    assert_eq!(scan_chunks(&mut rx, &cancel).await, ScanOutcome::Cancelled);
}
