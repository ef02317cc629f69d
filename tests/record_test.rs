//! Integration tests for publishing and finalizing recordings.

mod common;

use assert_matches::assert_matches;
use common::{audio, av_frames, video, TestHarness};
use streamvault::stream::{codes, FinalizeOutcome, SessionError, SessionSettings};
use streamvault::transport::{ControlMessage, InboundMessage};
use streamvault_common::{PublishingType, StreamId};
use streamvault_media::flv::HEADER_LEN;
use streamvault_media::{AmfValue, FlvDemuxer, StreamMetadata, TagKind};

async fn read_leading_metadata(path: &std::path::Path) -> (StreamMetadata, u64) {
    let file = tokio::fs::File::open(path).await.unwrap();
    let (mut demuxer, _) = FlvDemuxer::open(file).await.unwrap();
    let tag = demuxer.next_tag().await.unwrap().unwrap();
    assert_eq!(tag.kind, TagKind::Script);
    let metadata = StreamMetadata::from_data_values(&tag.script_values().unwrap()).unwrap();
    (metadata, demuxer.position())
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_announces_stream() {
    let h = TestHarness::new();
    let session = h.session(1);
    session.publish("cam1", "live").await.unwrap();

    assert_eq!(
        h.transport.controls(),
        vec![
            ControlMessage::StreamBegin {
                stream_id: StreamId::new(1)
            },
            ControlMessage::StreamIsRecorded {
                stream_id: StreamId::new(1)
            },
        ]
    );
    assert_eq!(h.transport.status_codes(), vec![codes::PUBLISH_START]);
    assert!(session.is_publishing().await);
    assert!(h.scratch_path("cam1").exists());
}

#[tokio::test]
async fn invalid_publish_touches_no_file() {
    let h = TestHarness::new();
    let session = h.session(1);

    assert_matches!(session.publish("", "live").await, Err(SessionError::Validation(_)));
    assert_matches!(session.publish("   ", "live").await, Err(SessionError::Validation(_)));
    assert_matches!(
        session.publish("cam1", "broadcast").await,
        Err(SessionError::Validation(_))
    );
    assert_matches!(
        session.publish("../cam1", "live").await,
        Err(SessionError::Validation(_))
    );

    assert!(h.files().is_empty());
    assert!(h.transport.sent().is_empty());
    assert!(!session.is_publishing().await);
}

#[tokio::test]
async fn publish_rejects_disallowed_type() {
    let h = TestHarness::new();
    let session = h.session_with(
        1,
        SessionSettings {
            allowed_types: vec![PublishingType::Live],
            ..SessionSettings::default()
        },
    );

    assert_matches!(
        session.publish("cam1", "append").await,
        Err(SessionError::Validation(_))
    );
    assert!(h.files().is_empty());
    session.publish("cam1", "live").await.unwrap();
}

#[tokio::test]
async fn second_publish_is_rejected() {
    let h = TestHarness::new();
    let session = h.session(1);
    session.publish("cam1", "live").await.unwrap();
    assert_matches!(
        session.publish("cam2", "live").await,
        Err(SessionError::AlreadyPublishing(name)) if name == "cam1"
    );
    assert!(!h.scratch_path("cam2").exists());
}

// ---------------------------------------------------------------------------
// Finalize
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finalize_single_keyframe_scenario() {
    let h = TestHarness::new();
    let session = h.session(1);
    session.publish("cam1", "live").await.unwrap();
    session.handle_message(video(0, true)).await.unwrap();
    session.handle_message(video(40, false)).await.unwrap();

    let outcome = session.delete_stream().await;
    assert_matches!(outcome, Some(FinalizeOutcome::Written { keyframes: 1, .. }));
    assert!(!h.scratch_path("cam1").exists());

    let (metadata, after_metadata) = read_leading_metadata(&h.final_path("cam1")).await;
    let index = metadata.keyframes.unwrap();
    assert_eq!(index.times(), &[0.0]);
    assert_eq!(index.positions(), &[after_metadata]);
    assert!(after_metadata > HEADER_LEN);
    assert_eq!(metadata.duration, Some(0.04));
}

#[tokio::test]
async fn every_indexed_offset_is_a_video_keyframe() {
    let h = TestHarness::new();
    let outcome = h.record("cam1", av_frames(5000, 40, 1000)).await;
    assert_matches!(
        outcome,
        FinalizeOutcome::Written { keyframes: 6, duration_secs, .. } if (duration_secs - 5.001).abs() < 1e-9
    );

    let path = h.final_path("cam1");
    let (metadata, _) = read_leading_metadata(&path).await;
    let index = metadata.keyframes.unwrap();
    assert_eq!(index.times(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

    let file = tokio::fs::File::open(&path).await.unwrap();
    let (mut demuxer, _) = FlvDemuxer::open(file).await.unwrap();
    for (time, offset) in index.iter() {
        demuxer.seek(offset).await.unwrap();
        let tag = demuxer.next_tag().await.unwrap().unwrap();
        assert_eq!(tag.kind, TagKind::Video);
        assert!(tag.is_key_frame());
        assert_eq!(tag.timestamp as f64, time * 1000.0);
    }
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let h = TestHarness::new();
    let session = h.session(7);
    session.publish("cam1", "record").await.unwrap();
    session.handle_message(video(0, true)).await.unwrap();
    session.handle_message(audio(20)).await.unwrap();

    assert_matches!(session.dispose().await, Some(FinalizeOutcome::Written { .. }));
    let first = std::fs::read(h.final_path("cam1")).unwrap();

    assert_eq!(session.dispose().await, None);
    assert_eq!(session.delete_stream().await, None);
    assert_eq!(std::fs::read(h.final_path("cam1")).unwrap(), first);
    assert_eq!(h.transport.destroyed(), vec![StreamId::new(7)]);
    assert!(session.is_disposed());
    assert_matches!(session.publish("cam2", "live").await, Err(SessionError::Disposed));
}

#[tokio::test]
async fn playback_position_does_not_leak_into_duration() {
    let h = TestHarness::new();
    h.record("archive", av_frames(5000, 40, 1000)).await;

    let session = h.session(1);
    session.publish("cam1", "live").await.unwrap();
    session.handle_message(video(0, true)).await.unwrap();
    session.handle_message(video(1000, false)).await.unwrap();

    session.play("archive", 0, 0, true).await.unwrap();
    session.playback().wait_idle().await;
    assert_eq!(session.clock().now(), 5001);

    let outcome = session.dispose().await;
    assert_matches!(
        outcome,
        Some(FinalizeOutcome::Written { duration_secs, .. }) if duration_secs == 1.0
    );
    let (metadata, _) = read_leading_metadata(&h.final_path("cam1")).await;
    assert_eq!(metadata.duration, Some(1.0));
}

#[tokio::test]
async fn empty_recording_writes_nothing() {
    let h = TestHarness::new();
    let session = h.session(1);
    session.publish("cam1", "live").await.unwrap();
    assert_eq!(session.dispose().await, Some(FinalizeOutcome::Skipped));
    assert!(h.files().is_empty());
}

#[tokio::test]
async fn header_flags_follow_recorded_media() {
    let h = TestHarness::new();
    h.record("audio_only", vec![audio(0), audio(23), audio(46)]).await;

    let file = tokio::fs::File::open(h.final_path("audio_only")).await.unwrap();
    let (_, header) = FlvDemuxer::open(file).await.unwrap();
    assert!(header.has_audio);
    assert!(!header.has_video);
}

// ---------------------------------------------------------------------------
// Metadata and ingestion failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publisher_metadata_is_persisted() {
    let h = TestHarness::new();
    let session = h.session(1);
    session.publish("cam1", "live").await.unwrap();
    session
        .handle_message(InboundMessage::Data {
            timestamp: 0,
            values: vec![
                AmfValue::string("@setDataFrame"),
                AmfValue::string("onMetaData"),
                AmfValue::EcmaArray(vec![
                    ("width".into(), AmfValue::Number(1280.0)),
                    ("duration".into(), AmfValue::Number(0.0)),
                ]),
            ],
        })
        .await
        .unwrap();
    assert_eq!(
        session.metadata().snapshot().unwrap().get("width"),
        Some(&AmfValue::Number(1280.0))
    );
    session.handle_message(video(0, true)).await.unwrap();
    session.handle_message(video(2000, false)).await.unwrap();
    session.dispose().await;

    let (metadata, _) = read_leading_metadata(&h.final_path("cam1")).await;
    assert_eq!(metadata.get("width"), Some(&AmfValue::Number(1280.0)));
    assert_eq!(metadata.duration, Some(2.0));
}

#[tokio::test]
async fn malformed_metadata_closes_connection() {
    let h = TestHarness::new();
    let session = h.session(1);
    session.publish("cam1", "live").await.unwrap();

    let result = session
        .handle_message(InboundMessage::Data {
            timestamp: 0,
            values: vec![AmfValue::string("@setDataFrame"), AmfValue::Number(1.0)],
        })
        .await;
    assert_matches!(result, Err(SessionError::Ingestion(_)));
    assert!(h.transport.is_closed());
}

#[tokio::test]
async fn media_without_publish_is_dropped() {
    let h = TestHarness::new();
    let session = h.session(1);
    session.handle_message(video(0, true)).await.unwrap();
    assert!(h.files().is_empty());
    assert_eq!(session.clock().now(), 0);
}
