use futures::{ stream, Stream, StreamExt };
use log::{ debug, info };
use std::sync::Arc;

use crate::error::{ RelayError, STREAM_FAILURE_MESSAGE };
use crate::llm::chat::{ ChatClient, ChunkStream };
use crate::models::chat::Turn;
use crate::models::relay::RelayFrame;

enum RelayState {
    Idle {
        client: Arc<dyn ChatClient>,
        api_key: String,
        turns: Vec<Turn>,
    },
    Forwarding(ChunkStream),
    Completed,
    Errored,
}

fn fail(err: RelayError) -> Option<(RelayFrame, RelayState)> {
    err.report();
    Some((RelayFrame::Error(STREAM_FAILURE_MESSAGE.to_string()), RelayState::Errored))
}

/// Lazily relays one streaming completion as caller-facing frames.
///
/// Nothing is sent upstream until the first poll. The stream yields delta
/// frames in arrival order and ends with exactly one terminal frame: `Done`
/// on the upstream sentinel, `Error` on any failure. Dropping it early drops
/// the upstream stream too.
pub fn relay_frames(
    client: Arc<dyn ChatClient>,
    api_key: String,
    turns: Vec<Turn>
) -> impl Stream<Item = RelayFrame> + Send {
    let initial = RelayState::Idle { client, api_key, turns };

    stream::unfold(initial, |mut state| async move {
        loop {
            state = match state {
                RelayState::Idle { client, api_key, turns } => {
                    match client.complete_stream(&api_key, &turns).await {
                        Ok(upstream) => RelayState::Forwarding(upstream),
                        Err(e) => {
                            return fail(e);
                        }
                    }
                }
                RelayState::Forwarding(mut upstream) => {
                    match upstream.next().await {
                        Some(Ok(chunk)) if chunk.is_final => {
                            info!("Streaming completed");
                            return Some((RelayFrame::Done, RelayState::Completed));
                        }
                        Some(Ok(chunk)) => {
                            match chunk.delta_content {
                                Some(delta) if !delta.is_empty() => {
                                    return Some((
                                        RelayFrame::Delta(delta),
                                        RelayState::Forwarding(upstream),
                                    ));
                                }
                                _ => RelayState::Forwarding(upstream),
                            }
                        }
                        Some(Err(e)) => {
                            return fail(e);
                        }
                        None => {
                            return fail(
                                RelayError::Upstream(
                                    "upstream closed the stream before the sentinel".to_string()
                                )
                            );
                        }
                    }
                }
                RelayState::Completed | RelayState::Errored => {
                    debug!("Relay stream closed");
                    return None;
                }
            };
        }
    })
}
