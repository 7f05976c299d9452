//! TCP envelope listener.
//!
//! Each connection is served by its own task: envelopes are decoded
//! incrementally, dispatched in arrival order and answered one-for-one. A
//! terminator from the client ends the session after an echoed terminator.

use std::future::Future;
use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use numass_core::error::{ErrorClass, NumassError, Result};
use numass_core::protocol::envelope::declared_total;
use numass_core::protocol::message::{self, error_response};
use numass_core::protocol::{Envelope, EnvelopeCodec};

use crate::app_state::AppState;

const READ_CAPACITY: usize = 8 * 1024;

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    tracing::info!(addr = ?listener.local_addr().ok(), "numass-server listening");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let app = app.clone();
                let span = tracing::info_span!("session", %peer);
                tokio::spawn(
                    async move {
                        if let Err(e) = run_session(app, stream, peer).await {
                            tracing::warn!(error = %e, "session ended with error");
                        }
                    }
                    .instrument(span),
                );
            }

            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

async fn run_session(app: AppState, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
    stream.set_nodelay(true)?;
    tracing::debug!(%peer, "session opened");

    let codec = app.codec();
    let dispatcher = app.dispatcher();
    let mut buf = BytesMut::with_capacity(READ_CAPACITY);

    loop {
        loop {
            let frame = match codec.try_decode(&mut buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    let reply = error_response("", &e)
                        .meta_type(app.cfg().server.meta_type)
                        .build();
                    let _ = write_envelope(&mut stream, &codec, &reply).await;
                    // Undecodable meta leaves the stream aligned; framing errors do not.
                    if matches!(e.class(), ErrorClass::MetaDecode | ErrorClass::UnknownMetaType) {
                        tracing::warn!(error = %e, "request meta rejected");
                        continue;
                    }
                    return Err(e);
                }
            };

            if message::is_terminator(&frame.envelope) {
                tracing::debug!("terminator received");
                let _ = write_envelope(&mut stream, &codec, &message::terminator()).await;
                let _ = stream.shutdown().await;
                return Ok(());
            }

            tracing::debug!(
                ty = ?frame.envelope.ty(),
                data_len = frame.envelope.data_length(),
                "request received"
            );
            let reply = dispatcher.dispatch(&frame.envelope).await;
            write_envelope(&mut stream, &codec, &reply).await?;
        }

        if stream.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                tracing::debug!("peer closed");
                return Ok(());
            }
            return Err(NumassError::IncompleteEnvelope {
                needed: declared_total(&buf)?.unwrap_or(buf.len() + 1),
                available: buf.len(),
            });
        }
    }
}

async fn write_envelope(stream: &mut TcpStream, codec: &EnvelopeCodec, envelope: &Envelope) -> Result<()> {
    let bytes = codec.encode(envelope)?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}
