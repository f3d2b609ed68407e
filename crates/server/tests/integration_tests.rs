//! Server Integration Tests
//!
//! Exercises the control socket against a live listener:
//! - Request/response exchange over a Unix socket
//! - Whitelist edits becoming visible to decisions
//! - Version mismatch and malformed frame handling
//! - Attach events flowing from the USB bridge to the enforcer
//!
//! Run with: `cargo test -p server --test integration_tests`

use common::test_utils::{
    DEFAULT_TEST_TIMEOUT, observed, reference_identity, variant_product, with_timeout,
};
use common::{ObservedDevice, UsbEvent, create_usb_bridge};
use protocol::{
    CMD_SET_ENTRY, ControlCommand, ControlError, ControlReply, ControlRequest, Message,
    MessagePayload, ProtocolVersion, Verdict, read_framed_async, write_framed_async,
};
use server::{
    ControlChannel, ControlListener, DecisionEngine, Enforcer, WhitelistStore,
    disabled_audit_logger, run_attach_loop,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

fn start_listener(path: &Path, channel: ControlChannel) -> tokio::task::JoinHandle<()> {
    let listener = ControlListener::bind(path, 0o600, channel).unwrap();
    tokio::spawn(async move {
        let _ = listener.run().await;
    })
}

async fn exchange(stream: &mut UnixStream, request: ControlRequest) -> MessagePayload {
    write_framed_async(stream, &Message::new(MessagePayload::Request(request)))
        .await
        .unwrap();
    with_timeout(DEFAULT_TEST_TIMEOUT, read_framed_async(stream))
        .await
        .expect("Timed out")
        .unwrap()
        .expect("Connection closed")
        .payload
}

mod control_socket {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn test_set_entry_over_socket_changes_verdict() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control.sock");

        let store = WhitelistStore::shared();
        let engine = DecisionEngine::new(store.clone());
        let server = start_listener(&path, ControlChannel::new(store));

        let mut stream = UnixStream::connect(&path).await.unwrap();
        assert_eq!(engine.decide(&reference_identity()), Verdict::Deny);

        let payload = exchange(
            &mut stream,
            ControlCommand::SetEntry(reference_identity()).to_request(),
        )
        .await;
        assert!(matches!(
            payload,
            MessagePayload::Response {
                result: Ok(ControlReply::Applied { changed: true })
            }
        ));

        assert_eq!(engine.decide(&reference_identity()), Verdict::Allow);
        assert_eq!(
            engine.decide(&variant_product(&reference_identity(), 0x6545)),
            Verdict::Deny
        );

        let payload = exchange(&mut stream, ControlCommand::ListEntries.to_request()).await;
        match payload {
            MessagePayload::Response {
                result: Ok(ControlReply::Entries { entries }),
            } => assert_eq!(entries, vec![reference_identity()]),
            other => panic!("Unexpected payload: {:?}", other),
        }

        server.abort();
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let store = WhitelistStore::shared();
        let server = start_listener(&path, ControlChannel::new(store.clone()));

        let mut stream = UnixStream::connect(&path).await.unwrap();

        let payload = exchange(&mut stream, ControlRequest::new(0x99, Vec::new())).await;
        assert!(matches!(
            payload,
            MessagePayload::Response {
                result: Err(ControlError::UnsupportedCommand { code: 0x99 })
            }
        ));

        let payload = exchange(&mut stream, ControlRequest::new(CMD_SET_ENTRY, vec![1, 2])).await;
        assert!(matches!(
            payload,
            MessagePayload::Response {
                result: Err(ControlError::InvalidArgument { .. })
            }
        ));

        assert!(store.is_empty());
        server.abort();
    }

    #[tokio::test]
    async fn test_incompatible_version_gets_error_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let server = start_listener(&path, ControlChannel::new(WhitelistStore::shared()));

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let message = Message {
            version: ProtocolVersion {
                major: 99,
                minor: 0,
                patch: 0,
            },
            payload: MessagePayload::Request(ControlCommand::ListEntries.to_request()),
        };
        write_framed_async(&mut stream, &message).await.unwrap();

        let reply = read_framed_async(&mut stream).await.unwrap().unwrap();
        assert!(matches!(reply.payload, MessagePayload::Error { .. }));

        // Server closes after the error frame
        assert!(read_framed_async(&mut stream).await.unwrap().is_none());
        server.abort();
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let server = start_listener(&path, ControlChannel::new(WhitelistStore::shared()));

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let reply = read_framed_async(&mut stream).await.unwrap().unwrap();
        match reply.payload {
            MessagePayload::Error { message } => assert!(message.contains("Frame too large")),
            other => panic!("Unexpected payload: {:?}", other),
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_socket_permissions_and_stale_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control.sock");
        std::fs::write(&path, b"stale").unwrap();

        let listener =
            ControlListener::bind(&path, 0o600, ControlChannel::new(WhitelistStore::shared()))
                .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        drop(listener);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_many_clients() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let store = WhitelistStore::shared();
        let server = start_listener(&path, ControlChannel::new(store.clone()));

        let clients: Vec<_> = (0..8u16)
            .map(|pid| {
                let path = path.clone();
                tokio::spawn(async move {
                    let mut stream = UnixStream::connect(&path).await.unwrap();
                    let identity = variant_product(&reference_identity(), pid);
                    exchange(&mut stream, ControlCommand::SetEntry(identity).to_request()).await
                })
            })
            .collect();
        for client in clients {
            client.await.unwrap();
        }

        assert_eq!(store.len(), 8);
        server.abort();
    }
}

mod attach_path {
    use super::*;

    #[derive(Default)]
    struct RecordingEnforcer {
        verdicts: Mutex<Vec<(ObservedDevice, Verdict)>>,
    }

    impl Enforcer for RecordingEnforcer {
        fn enforce(&self, device: &ObservedDevice, verdict: Verdict) {
            self.verdicts.lock().unwrap().push((device.clone(), verdict));
        }
    }

    #[tokio::test]
    async fn test_whitelisted_device_allowed_on_attach() {
        let store = WhitelistStore::shared();
        let channel = ControlChannel::new(store.clone());
        channel.execute(ControlCommand::SetEntry(reference_identity()));

        let enforcer = Arc::new(RecordingEnforcer::default());
        let (bridge, worker) = create_usb_bridge();
        let attach = tokio::spawn(run_attach_loop(
            bridge,
            DecisionEngine::new(store),
            enforcer.clone(),
            disabled_audit_logger(),
        ));

        let allowed = observed(5, reference_identity());
        let denied = observed(6, variant_product(&reference_identity(), 0x6545));
        let events = vec![
            UsbEvent::DeviceArrived {
                device: allowed.clone(),
            },
            UsbEvent::DeviceArrived {
                device: denied.clone(),
            },
        ];
        std::thread::spawn(move || {
            for event in events {
                worker.send_event(event).unwrap();
            }
        })
        .join()
        .unwrap();

        with_timeout(DEFAULT_TEST_TIMEOUT, attach)
            .await
            .expect("Attach loop did not exit")
            .unwrap();

        assert_eq!(
            *enforcer.verdicts.lock().unwrap(),
            vec![(allowed, Verdict::Allow), (denied, Verdict::Deny)]
        );
    }
}
