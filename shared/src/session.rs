//! Per-connection pump between a byte stream and a registered [`Connection`]

use crate::frame::{write_message, FrameError, FrameReader};
use crate::network::NetworkUpdate;
use crate::router::Connection;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

/// Runs the reader and writer halves of one connection until either ends.
///
/// Decoded frames go to [`Connection::submit`]; updates taken from the
/// outbound mailbox are written as frames. The session ends when the peer
/// closes the stream, the mailbox is closed, or either side fails. The
/// caller is responsible for disconnecting the connection afterwards.
pub async fn run_session<R, W>(
    reader: R,
    mut writer: W,
    connection: &Connection,
) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FrameReader::new(reader);

    let inbound = async {
        while let Some(update) = frames.read_message::<NetworkUpdate>().await? {
            connection.submit(update);
        }
        debug!("Connection {} closed by peer", connection.id);
        Ok::<(), FrameError>(())
    };

    let outbound = async {
        while let Some(update) = connection.outbound.receive().await {
            write_message(&mut writer, &update).await?;
        }
        debug!("Connection {} outbound mailbox closed", connection.id);
        Ok::<(), FrameError>(())
    };

    tokio::select! {
        result = inbound => result,
        result = outbound => result,
    }
}
