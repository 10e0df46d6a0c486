// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::net::TcpListener;

#[test]
fn call_frame_round_trips_through_json() -> anyhow::Result<()> {
    let frame = WireFrame::Call {
        call_id: 7,
        method: "messages".to_owned(),
        args: vec![serde_json::json!({"client_id": "agent-1", "version": 1})],
    };
    let bytes = encode(&frame)?;
    let decoded = decode(&bytes)?;
    match decoded {
        WireFrame::Call { call_id, method, args } => {
            assert_eq!(call_id, 7);
            assert_eq!(method, "messages");
            assert_eq!(args.len(), 1);
            assert_eq!(args[0]["client_id"], "agent-1");
        }
        other => panic!("expected Call, got {other:?}"),
    }
    Ok(())
}

#[test]
fn reply_frame_omits_error_when_ok() -> anyhow::Result<()> {
    let frame = WireFrame::Reply { call_id: 1, ok: true, error: None };
    let bytes = encode(&frame)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert!(!value.as_object().expect("object").contains_key("error"));
    Ok(())
}

#[tokio::test]
async fn frames_round_trip_over_a_real_socket() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let (mut reader, mut writer) = split(stream);
        let frame = reader.recv().await?.expect("frame");
        writer.send(&frame).await?;
        Ok::<_, io::Error>(())
    });

    let client_stream = TcpStream::connect(addr).await?;
    let (mut reader, mut writer) = split(client_stream);
    let sent = WireFrame::Data { call_id: 3, payload: serde_json::json!({"name": "ping"}) };
    writer.send(&sent).await?;
    let echoed = reader.recv().await?.expect("echoed frame");

    match echoed {
        WireFrame::Data { call_id, payload } => {
            assert_eq!(call_id, 3);
            assert_eq!(payload["name"], "ping");
        }
        other => panic!("expected Data, got {other:?}"),
    }

    server.await??;
    Ok(())
}
