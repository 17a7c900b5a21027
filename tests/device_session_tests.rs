// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for exclusive camera ownership

mod common;

use common::{FakePlatform, settle};
use std::sync::Arc;
use vioscan::backends::camera::CameraFacing;
use vioscan::errors::{ACQUIRE_CANCELLED, CameraError, PlatformErrorCode};
use vioscan::scan::DeviceSession;

#[tokio::test]
async fn test_acquire_and_release() {
    let platform = FakePlatform::new();
    let session = DeviceSession::new(Arc::clone(&platform));

    let stream = session.acquire(CameraFacing::Environment).await.unwrap();
    assert_eq!(stream.facing(), CameraFacing::Environment);
    assert!(session.is_held());

    session.release().await;
    assert!(!session.is_held());
    assert_eq!(platform.closed(), 1);
}

#[tokio::test]
async fn test_second_acquire_is_busy_without_touching_hardware() {
    let platform = FakePlatform::new();
    let session = DeviceSession::new(Arc::clone(&platform));

    session.acquire(CameraFacing::Environment).await.unwrap();
    let err = session.acquire(CameraFacing::User).await.unwrap_err();

    assert_eq!(err, CameraError::DeviceBusy);
    assert_eq!(platform.attempts(), vec![CameraFacing::Environment]);
    assert_eq!(platform.opened(), 1);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let platform = FakePlatform::new();
    let session = DeviceSession::new(Arc::clone(&platform));

    // Never acquired
    session.release().await;

    session.acquire(CameraFacing::User).await.unwrap();
    session.release().await;
    session.release().await;

    assert_eq!(platform.opened(), 1);
    assert_eq!(platform.closed(), 1);
}

#[tokio::test]
async fn test_platform_errors_are_mapped() {
    let cases = [
        (PlatformErrorCode::NotAllowed, "denied", CameraError::PermissionDenied),
        (PlatformErrorCode::NotFound, "none", CameraError::NoDevice),
        (PlatformErrorCode::Overconstrained, "no rear camera", CameraError::NoDevice),
        (PlatformErrorCode::NotReadable, "claimed", CameraError::DeviceBusy),
        (
            PlatformErrorCode::Other,
            "Could not start video source",
            CameraError::DeviceBusy,
        ),
        (
            PlatformErrorCode::NotSupported,
            "no decodable pixel format",
            CameraError::Unknown("no decodable pixel format".to_string()),
        ),
        (
            PlatformErrorCode::Other,
            "boom",
            CameraError::Unknown("boom".to_string()),
        ),
    ];

    for (code, message, expected) in cases {
        let platform = FakePlatform::new();
        platform.fail(CameraFacing::Environment, code, message);
        let session = DeviceSession::new(Arc::clone(&platform));

        let err = session.acquire(CameraFacing::Environment).await.unwrap_err();
        assert_eq!(err, expected, "mapping {:?}", code);
        assert!(!session.is_held());

        // A failed acquire leaves the session free for another attempt
        platform.clear_failures();
        assert!(session.acquire(CameraFacing::Environment).await.is_ok());
    }
}

#[tokio::test]
async fn test_release_during_acquire_closes_new_stream() {
    let platform = FakePlatform::new();
    platform.close_gate();
    let session = Arc::new(DeviceSession::new(Arc::clone(&platform)));

    let acquiring = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.acquire(CameraFacing::Environment).await })
    };
    settle().await;
    assert!(session.is_acquiring());

    session.release().await;
    platform.open_gate();
    let err = acquiring.await.unwrap().unwrap_err();

    assert_eq!(err, CameraError::Unknown(ACQUIRE_CANCELLED.to_string()));
    assert!(!session.is_held());
    assert_eq!(platform.opened(), 1);
    assert_eq!(platform.closed(), 1);
}

#[tokio::test]
async fn test_acquire_while_acquiring_is_busy() {
    let platform = FakePlatform::new();
    platform.close_gate();
    let session = Arc::new(DeviceSession::new(Arc::clone(&platform)));

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.acquire(CameraFacing::Environment).await })
    };
    settle().await;

    assert_eq!(
        session.acquire(CameraFacing::User).await.unwrap_err(),
        CameraError::DeviceBusy
    );

    platform.open_gate();
    assert!(first.await.unwrap().is_ok());
    assert_eq!(platform.attempts(), vec![CameraFacing::Environment]);
}

#[tokio::test]
async fn test_release_stream_ignores_other_streams() {
    let platform = FakePlatform::new();
    let session = DeviceSession::new(Arc::clone(&platform));

    let old = session.acquire(CameraFacing::Environment).await.unwrap();
    session.release().await;
    let current = session.acquire(CameraFacing::Environment).await.unwrap();

    session.release_stream(&old).await;
    assert!(session.is_held());

    session.release_stream(&current).await;
    assert!(!session.is_held());
    assert_eq!(platform.live(), 0);
}

#[tokio::test]
async fn test_torch_errors() {
    let platform = FakePlatform::new();
    let session = DeviceSession::new(Arc::clone(&platform));

    // No stream yet
    assert!(matches!(
        session.apply_torch(true).await,
        Err(CameraError::Unknown(_))
    ));

    session.acquire(CameraFacing::Environment).await.unwrap();
    assert_eq!(session.apply_torch(true).await, Ok(()));

    platform.fail_torch(PlatformErrorCode::NotSupported);
    let err = session.apply_torch(false).await.unwrap_err();
    assert_eq!(err, CameraError::UnsupportedFeature);
    assert!(err.is_ignorable());
}

#[tokio::test]
async fn test_drop_closes_held_stream() {
    let platform = FakePlatform::new();
    let session = DeviceSession::new(Arc::clone(&platform));
    session.acquire(CameraFacing::Environment).await.unwrap();

    drop(session);
    settle().await;

    assert_eq!(platform.live(), 0);
}
