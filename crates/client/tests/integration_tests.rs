//! Client Integration Tests
//!
//! Runs the control client against a real listener on a temporary socket:
//! - Allow, revoke and list round trips
//! - Raw requests with unsupported codes and bad arguments
//! - Connection failures
//!
//! Run with: `cargo test -p client --test integration_tests`

use client::{ControlClient, parse_hex_bytes};
use common::test_utils::{identity_batch, reference_identity, variant_product};
use protocol::{
    CMD_REMOVE_ENTRY, ControlError, ControlRequest, Verdict, encode_identity,
};
use server::{ControlChannel, ControlListener, DecisionEngine, SharedWhitelist, WhitelistStore};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

struct Daemon {
    _dir: TempDir,
    socket: std::path::PathBuf,
    whitelist: SharedWhitelist,
    task: tokio::task::JoinHandle<()>,
}

impl Daemon {
    fn start() -> Self {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("control.sock");
        let whitelist = WhitelistStore::shared();
        let listener =
            ControlListener::bind(&socket, 0o600, ControlChannel::new(whitelist.clone())).unwrap();
        let task = tokio::spawn(async move {
            let _ = listener.run().await;
        });

        Self {
            _dir: dir,
            socket,
            whitelist,
            task,
        }
    }

    async fn client(&self) -> ControlClient {
        ControlClient::connect(&self.socket)
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(5))
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

mod whitelist_commands {
    use super::*;

    #[tokio::test]
    async fn test_allow_list_revoke() {
        let daemon = Daemon::start();
        let engine = DecisionEngine::new(daemon.whitelist.clone());
        let mut client = daemon.client().await;

        assert!(client.allow(reference_identity()).await.unwrap());
        assert!(!client.allow(reference_identity()).await.unwrap());
        assert_eq!(engine.decide(&reference_identity()), Verdict::Allow);
        assert_eq!(
            engine.decide(&variant_product(&reference_identity(), 0x6545)),
            Verdict::Deny
        );

        assert_eq!(client.list().await.unwrap(), vec![reference_identity()]);

        assert!(client.revoke(reference_identity()).await.unwrap());
        assert!(!client.revoke(reference_identity()).await.unwrap());
        assert_eq!(engine.decide(&reference_identity()), Verdict::Deny);
        assert!(client.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let daemon = Daemon::start();
        let mut client = daemon.client().await;

        let mut batch = identity_batch(10);
        batch.reverse();
        for identity in &batch {
            client.allow(identity.clone()).await.unwrap();
        }

        assert_eq!(client.list().await.unwrap(), batch);
    }

    #[tokio::test]
    async fn test_identity_text_form_round_trips_through_daemon() {
        let daemon = Daemon::start();
        let mut client = daemon.client().await;

        let identity = "0930:6544:001D92DC4AF0C95163A2092C".parse().unwrap();
        client.allow(identity).await.unwrap();

        let listed = client.list().await.unwrap();
        assert_eq!(listed[0].to_string(), "0930:6544:001D92DC4AF0C95163A2092C");
    }
}

mod raw_requests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_code() {
        let daemon = Daemon::start();
        let mut client = daemon.client().await;

        let result = client
            .request(ControlRequest::new(0x1234, Vec::new()))
            .await
            .unwrap();
        assert_eq!(result, Err(ControlError::UnsupportedCommand { code: 0x1234 }));
        assert!(daemon.whitelist.is_empty());
    }

    #[tokio::test]
    async fn test_hex_argument_from_command_line() {
        let daemon = Daemon::start();
        let mut client = daemon.client().await;
        client.allow(reference_identity()).await.unwrap();

        let hex: String = encode_identity(&reference_identity())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        let argument = parse_hex_bytes(&hex).unwrap();

        let result = client
            .request(ControlRequest::new(CMD_REMOVE_ENTRY, argument))
            .await
            .unwrap();
        assert!(result.is_ok());
        assert!(daemon.whitelist.is_empty());
    }

    #[tokio::test]
    async fn test_typed_error_surfaces_through_send() {
        let daemon = Daemon::start();
        let mut client = daemon.client().await;

        let result = client
            .request(ControlRequest::new(CMD_REMOVE_ENTRY, vec![0xff; 4]))
            .await
            .unwrap();
        assert!(matches!(result, Err(ControlError::InvalidArgument { .. })));
    }
}

mod connection {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_missing_socket_fails() {
        let dir = tempdir().unwrap();
        let result = ControlClient::connect(dir.path().join("absent.sock")).await;
        let err = result.err().expect("connect should fail");
        assert!(format!("{:#}", err).contains("Failed to connect"));
    }

    #[tokio::test]
    async fn test_clients_share_one_whitelist() {
        let daemon = Daemon::start();
        let mut first = daemon.client().await;
        let mut second = daemon.client().await;

        first.allow(reference_identity()).await.unwrap();
        assert_eq!(second.list().await.unwrap(), vec![reference_identity()]);
    }
}
