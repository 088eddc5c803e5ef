//! Integration tests for uvpack-bridge.
//!
//! These tests drive the host and engine halves of the protocol against each
//! other over in-memory pipes.

use tokio::io::duplex;
use uvpack_bridge::codec::{EncodedRequest, Request};
use uvpack_bridge::engine::{identity_results, read_request, EngineResponder};
use uvpack_bridge::mesh::EditableMesh;
use uvpack_bridge::protocol::{DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
use uvpack_bridge::transport::{send_request, FrameReader};
use uvpack_bridge::writer::apply_results;
use uvpack_bridge::{HostMesh, PackMode, PackOptions, ResponseFrame, ResultSet, RotationStep};

fn triangle() -> EditableMesh {
    EditableMesh::new(
        "Tri",
        1,
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![vec![0, 1, 2]],
    )
    .with_uvs(vec![vec![[0.1, 0.1], [0.9, 0.1], [0.1, 0.9]]])
}

fn quad() -> EditableMesh {
    EditableMesh::new(
        "Quad",
        2,
        vec![
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 2.0, 0.0],
            [0.0, 2.0, 0.0],
        ],
        vec![vec![0, 1, 2, 3]],
    )
    .with_uvs(vec![vec![
        [1.0 / 3.0, 0.0],
        [1.0, 1.0 / 7.0],
        [1.0, 1.0],
        [0.0, 1.0],
    ]])
}

fn encode(meshes: &[EditableMesh], options: PackOptions) -> EncodedRequest {
    let snapshots = meshes.iter().map(|m| m.snapshot()).collect();
    Request::new(options, snapshots).encode().unwrap()
}

/// Full cycle: request over a pipe, engine echoes UVs, host replays them.
#[tokio::test]
async fn test_identity_cycle_is_bit_exact() {
    let mut meshes = vec![triangle(), quad()];
    let before: Vec<_> = meshes.iter().map(|m| m.snapshot()).collect();
    let encoded = encode(&meshes, PackOptions::default());

    let (mut host_stdin, mut engine_stdin) = duplex(64 * 1024);
    let (engine_stdout, host_stdout) = duplex(64 * 1024);

    let engine = tokio::spawn(async move {
        let request = read_request(&mut engine_stdin, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        let mut responder = EngineResponder::new(engine_stdout);
        responder.progress(0.5).await.unwrap();
        responder
            .success(&identity_results(&request, 0.875))
            .await
            .unwrap();
        request
    });

    send_request(&mut host_stdin, &encoded.framed).await.unwrap();

    let mut reader = FrameReader::new(host_stdout);
    let mut progress = Vec::new();
    let mut results = None;
    while let Some(frame) = reader.next_frame().await.unwrap() {
        match frame {
            ResponseFrame::Progress(p) => progress.push(p),
            ResponseFrame::Success(r) => results = Some(r),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    let request = engine.await.unwrap();
    assert_eq!(request.objects.len(), 2);
    assert_eq!(request.objects[1].0, 1);
    assert_eq!(progress, vec![0.5]);

    let results = results.unwrap();
    assert_eq!(format!("{:.2}", results.coverage), "0.88");

    let report = apply_results(&mut meshes, &encoded.layouts, &results);
    assert!(report.is_clean());
    assert_eq!(report.written, 2);

    for (mesh, original) in meshes.iter().zip(&before) {
        let after = mesh.snapshot();
        let bits = |uvs: Vec<[f64; 2]>| -> Vec<u64> {
            uvs.iter().flat_map(|uv| [uv[0].to_bits(), uv[1].to_bits()]).collect()
        };
        assert_eq!(bits(after.uvs()), bits(original.uvs()));
    }
}

/// The options block survives the trip to the engine unchanged.
#[tokio::test]
async fn test_engine_sees_submitted_options() {
    let options = PackOptions::builder()
        .pack_mode(PackMode::HighQuality)
        .size(2048, 512)
        .padding(4.5)
        .combine(false)
        .full_rotation(true)
        .rotation_step(RotationStep::Deg45)
        .tiles(2, 3)
        .build()
        .unwrap();
    let encoded = encode(&[quad()], options);

    let mut stream = &encoded.framed[..];
    let request = read_request(&mut stream, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
    assert_eq!(request.options, options);
}

/// Results are joined by object index, not by position in the result set.
#[tokio::test]
async fn test_results_in_any_order() {
    let mut meshes = vec![triangle(), quad()];
    let encoded = encode(&meshes, PackOptions::default());

    let mut stream = &encoded.framed[..];
    let request = read_request(&mut stream, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
    let mut results = identity_results(&request, 0.5);
    results.objects.reverse();
    for object in &mut results.objects {
        for uv in &mut object.uvs {
            uv[0] += 10.0;
        }
    }

    let report = apply_results(&mut meshes, &encoded.layouts, &results);
    assert_eq!(report.written, 2);
    assert_eq!(meshes[0].loop_uv(0, 0), Some([0.1 + 10.0, 0.1]));
    assert_eq!(meshes[1].loop_uv(0, 3), Some([10.0, 1.0]));
}

/// A short response stream surfaces as a transport error.
#[tokio::test]
async fn test_engine_exit_mid_stream() {
    let (engine_stdout, host_stdout) = duplex(1024);
    let mut responder = EngineResponder::new(engine_stdout);
    responder.progress(0.1).await.unwrap();
    drop(responder);

    let mut reader = FrameReader::new(host_stdout);
    assert_eq!(
        reader.next_frame().await.unwrap(),
        Some(ResponseFrame::Progress(0.1))
    );
    assert!(matches!(
        reader.next_frame().await,
        Err(uvpack_bridge::PackError::Transport(_))
    ));
}

/// Oversized frames are refused before their body is read.
#[tokio::test]
async fn test_frame_limit() {
    let results = ResultSet {
        objects: Vec::new(),
        coverage: 1.0,
    };
    let (engine_stdout, host_stdout) = duplex(1024);
    let mut responder = EngineResponder::new(engine_stdout);
    responder.success(&results).await.unwrap();

    let mut reader = FrameReader::with_max_frame_size(host_stdout, 8);
    assert!(matches!(
        reader.next_frame().await,
        Err(uvpack_bridge::PackError::Protocol(_))
    ));
}

/// The request's length prefix covers exactly the body.
#[test]
fn test_request_length_prefix() {
    let encoded = encode(&[triangle(), quad()], PackOptions::default());
    let prefix = u32::from_le_bytes(encoded.framed[..4].try_into().unwrap());
    assert_eq!(prefix as usize + LENGTH_PREFIX_SIZE, encoded.framed.len());
}
